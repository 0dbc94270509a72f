use std::rc::Rc;

use quill_bytecode::inst::InstContainer;

use crate::value::{ObjectRef, Value};

/// One invocation of a function.
///
/// The frame's slots start at `stack_base`: first the arguments, then the
/// remaining locals. The callee object sits right below the base.
#[derive(Debug, Clone)]
pub(crate) struct CallFrame {
    /// The function this frame is tied to. Keeps it alive while it runs.
    pub function: ObjectRef,
    pub code: Rc<[i32]>,
    pub constants: Rc<[Value]>,
    pub ip: usize,
    pub stack_base: usize,
    pub local_count: usize,
}

impl CallFrame {
    pub fn constant(&self, idx: usize) -> Value {
        match self.constants.get(idx) {
            Some(v) => *v,
            None => panic!("corrupt bytecode: constant {} out of range", idx),
        }
    }
}

impl InstContainer for CallFrame {
    fn seek(&mut self, position: usize) {
        self.ip = position
    }

    fn read_word(&mut self) -> i32 {
        let word = match self.code.get(self.ip) {
            Some(w) => *w,
            None => panic!("corrupt bytecode: read past the end of the instruction stream"),
        };
        self.ip += 1;
        word
    }
}
