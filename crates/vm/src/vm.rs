pub(crate) mod frame;
#[cfg(test)]
mod test;

use std::cell::RefCell;
use std::rc::Rc;

use quill_bytecode::inst::{Inst, InstContainer};
use quill_bytecode::{Constant, Function, Program};
use tracing::{debug, trace};

use crate::builtin::{BuiltinDef, BuiltinRegistry};
use crate::error::RuntimeError;
use crate::gc::alloc::Heap;
use crate::value::{
    Builtin, BuiltinPayload, FunctionObject, Object, ObjectRef, RefTarget, Table, TableKey, Value,
};
use frame::CallFrame;

/// Capacities of a virtual machine.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Values the operand stack can hold
    pub stack_capacity: usize,
    /// Nested calls allowed
    pub frame_capacity: usize,
    pub global_capacity: usize,
    /// Live object count that triggers the first collection
    pub gc_threshold: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_capacity: 16384,
            frame_capacity: 256,
            global_capacity: 4096,
            gc_threshold: 1024,
        }
    }
}

/// Result after executing an instruction
#[derive(Debug)]
enum InstResult {
    Continue,
    /// The current frame returned, with its result if it had one.
    Return(Option<Value>),
}

/// A stack machine executing compiled programs against its own heap.
pub struct VirtualMachine {
    // Dropped before the registry: objects created by an extension must go
    // before its library is unloaded.
    heap: Heap,
    registry: Rc<RefCell<BuiltinRegistry>>,
}

impl VirtualMachine {
    pub fn new(config: VmConfig, registry: Rc<RefCell<BuiltinRegistry>>) -> Self {
        VirtualMachine {
            heap: Heap::new(&config),
            registry,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The raw value of a global slot.
    pub fn global(&self, slot: usize) -> Option<Value> {
        self.heap.global(slot)
    }

    pub fn display(&self, v: Value) -> String {
        self.heap.display(v)
    }

    pub fn collect_garbage(&mut self) -> usize {
        self.heap.collect()
    }

    /// Reclaim every object. Globals are reset to `nil`.
    pub fn shutdown(&mut self) -> usize {
        self.heap.shutdown()
    }

    /// Run a program's top-level code. Returns the value of a top-level
    /// `return` if there was one.
    ///
    /// On error the stacks are reset to where they were, so the machine
    /// stays usable. Globals keep whatever was stored before the error.
    pub fn run(&mut self, program: &Program) -> Result<Option<Value>, RuntimeError> {
        if program.globals.len() > self.heap.global_capacity() {
            return Err(RuntimeError::StackOverflow("global slots"));
        }
        debug!(
            globals = program.globals.len(),
            words = program.main.code.len(),
            "running program"
        );

        let main = load_function(&mut self.heap, &program.main);
        self.guarded(|vm| {
            let depth = vm.heap.frames.len();
            vm.heap.push(Value::Object(main))?;
            vm.call_value(0)?;
            vm.execute(depth)
        })
    }

    /// Call `callee` with `args` and run it to completion.
    ///
    /// The result is not rooted; store it somewhere reachable before the
    /// next allocation if it must survive a collection.
    pub fn call(&mut self, callee: Value, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
        self.guarded(|vm| {
            let depth = vm.heap.frames.len();
            let height = vm.heap.stack.len();
            vm.heap.push(callee)?;
            for arg in args {
                vm.heap.push(*arg)?;
            }
            if vm.call_value(args.len())? {
                vm.execute(depth)
            } else if vm.heap.stack.len() > height {
                Ok(vm.heap.stack.pop())
            } else {
                Ok(None)
            }
        })
    }

    /// Run `f`, restoring both stacks if it fails.
    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let height = self.heap.stack.len();
        let depth = self.heap.frames.len();
        let res = f(self);
        if let Err(e) = &res {
            debug!(error = %e, "runtime error, unwinding");
            self.heap.stack.truncate(height);
            self.heap.frames.truncate(depth);
        }
        res
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.heap
            .frames
            .last_mut()
            .expect("no active call frame while executing")
    }

    fn operand(&mut self) -> usize {
        self.frame_mut().read_operand()
    }

    /// Execute until the frame count drops to `stop_depth`, and return the
    /// result of the frame that returned last.
    fn execute(&mut self, stop_depth: usize) -> Result<Option<Value>, RuntimeError> {
        loop {
            let inst = self.frame_mut().read_inst();
            match self.exec_inst(inst)? {
                InstResult::Continue => {}
                InstResult::Return(result) => {
                    if self.heap.frames.len() <= stop_depth {
                        return Ok(result);
                    }
                    if let Some(v) = result {
                        self.heap.push(v)?;
                    }
                }
            }
        }
    }

    fn exec_inst(&mut self, inst: Inst) -> Result<InstResult, RuntimeError> {
        use InstResult::*;
        match inst {
            Inst::Constant => {
                let idx = self.operand();
                let v = self.frame_mut().constant(idx);
                self.heap.push(v)?;
            }
            Inst::Add | Inst::Sub | Inst::Mul | Inst::Div | Inst::Greater | Inst::Less => {
                self.exec_binary(inst)?
            }
            Inst::BitAnd | Inst::BitOr | Inst::BitXor => self.exec_bitwise(inst)?,
            Inst::Equal | Inst::And | Inst::Or => {
                let left = self.heap.actual_value(self.heap.peek(0)?)?;
                let right = self.heap.actual_value(self.heap.peek(1)?)?;
                let res = match inst {
                    Inst::Equal => self.heap.values_equal(left, right),
                    Inst::And => left.is_truthy() && right.is_truthy(),
                    _ => left.is_truthy() || right.is_truthy(),
                };
                self.heap.pop_n(2)?;
                self.heap.push(Value::Bool(res))?;
            }
            Inst::Not | Inst::Minus | Inst::BitNot => {
                let operand = self.heap.pop()?;
                let operand = self.heap.actual_value(operand)?;
                let res = match (inst, operand) {
                    (Inst::Not, v) => Value::Bool(!v.is_truthy()),
                    (Inst::Minus, Value::Number(n)) => Value::Number(-n),
                    (Inst::BitNot, Value::Number(n)) => Value::Number(!(n as i64) as f64),
                    (_, v) => {
                        return Err(RuntimeError::UnaryTypeMismatch {
                            op: if inst == Inst::Minus { "-" } else { "~" },
                            operand: self.heap.type_name(v),
                        })
                    }
                };
                self.heap.push(res)?;
            }

            Inst::Array => {
                let count = self.operand();
                // The first element is on top.
                let items = self.heap.peek_n(count)?.iter().rev().copied().collect();
                let array = self.heap.alloc(Object::Array(items));
                self.heap.pop_n(count)?;
                self.heap.push(Value::Object(array))?;
            }
            Inst::GetIndex => self.exec_get_index()?,
            Inst::SetIndex => self.exec_set_index()?,
            Inst::Struct => {
                let count = self.operand();
                let mut table = Table::new();
                for pair in self.heap.peek_n(count * 2)?.chunks(2) {
                    let key = self.member_key(pair[1])?;
                    table.set(key, pair[0]);
                }
                let obj = self.heap.alloc(Object::Struct(table));
                self.heap.pop_n(count * 2)?;
                self.heap.push(Value::Object(obj))?;
            }
            Inst::GetStruct => {
                let target = self.heap.actual_value(self.heap.peek(0)?)?;
                let name = self.heap.actual_value(self.heap.peek(1)?)?;
                let key = self.member_key(name)?;
                let v = self.struct_table(target)?.get(&key);
                match v {
                    Some(v) => {
                        self.heap.pop_n(2)?;
                        self.heap.push(v)?;
                    }
                    None => return Err(RuntimeError::NoSuchMember(key.text)),
                }
            }
            Inst::SetStruct => {
                let target = self.heap.actual_value(self.heap.peek(0)?)?;
                let name = self.heap.actual_value(self.heap.peek(1)?)?;
                let value = self.heap.peek(2)?;
                let key = self.member_key(name)?;
                self.struct_table(target)?;
                if let Value::Object(obj) = target {
                    if let Object::Struct(table) = self.heap.object_mut(obj) {
                        table.set(key, value);
                    }
                }
                self.heap.pop_n(2)?;
            }

            Inst::Jump => {
                let target = self.operand();
                self.frame_mut().seek(target);
            }
            Inst::JumpIfFalse => {
                let target = self.operand();
                let cond = self.heap.pop()?;
                let cond = self.heap.actual_value(cond)?;
                if !cond.is_truthy() {
                    self.frame_mut().seek(target);
                }
            }

            Inst::GetGlobal => {
                let slot = self.operand();
                let v = self
                    .heap
                    .global(slot)
                    .ok_or(RuntimeError::StackOverflow("global slots"))?;
                self.heap.push(v)?;
            }
            Inst::SetGlobal => {
                let slot = self.operand();
                let v = self.heap.peek(0)?;
                self.heap.set_global(slot, v)?;
            }
            Inst::GetLocal => {
                let slot = self.read_local_slot()?;
                let v = self.heap.read_target(RefTarget::Stack(slot))?;
                self.heap.push(v)?;
            }
            Inst::SetLocal => {
                let slot = self.read_local_slot()?;
                let v = self.heap.peek(0)?;
                self.heap.store(RefTarget::Stack(slot), v)?;
            }
            Inst::GetBuiltin => {
                let idx = self.operand();
                let obj = self.builtin_object(idx);
                self.heap.push(Value::Object(obj))?;
            }

            Inst::RefGlobal => {
                let slot = self.operand();
                if slot >= self.heap.global_capacity() {
                    return Err(RuntimeError::StackOverflow("global slots"));
                }
                let r = self.heap.alloc(Object::Ref(RefTarget::Global(slot)));
                self.heap.push(Value::Object(r))?;
            }
            Inst::RefLocal => {
                let slot = self.read_local_slot()?;
                let r = self.heap.alloc(Object::Ref(RefTarget::Stack(slot)));
                self.heap.push(Value::Object(r))?;
            }
            Inst::RefIndexGlobal => {
                let slot = self.operand();
                self.exec_ref_index(RefTarget::Global(slot))?;
            }
            Inst::RefIndexLocal => {
                let slot = self.read_local_slot()?;
                self.exec_ref_index(RefTarget::Stack(slot))?;
            }

            Inst::Call => {
                let argc = self.operand();
                self.call_value(argc)?;
            }
            Inst::Return => {
                let count = self.operand();
                let result = if count == 1 {
                    Some(self.heap.pop()?)
                } else {
                    None
                };
                let frame = self
                    .heap
                    .frames
                    .pop()
                    .expect("no active call frame while returning");
                trace!(depth = self.heap.frames.len(), has_result = result.is_some(), "return");
                self.heap.stack.truncate(frame.stack_base - 1);
                return Ok(Return(result));
            }
            Inst::Discard => self.heap.truncate_to_floor(),
            Inst::Import => {
                let idx = self.operand();
                let path = match self.frame_mut().constant(idx) {
                    Value::Object(obj) => self.heap.object(obj).as_str().map(|s| s.text.clone()),
                    _ => None,
                };
                let path = path.expect("corrupt bytecode: import path is not a string");
                self.registry.borrow_mut().load_library(&path)?;
            }
        }
        Ok(Continue)
    }

    /// Arithmetic and ordering. The left operand is on top.
    fn exec_binary(&mut self, inst: Inst) -> Result<(), RuntimeError> {
        let left = self.heap.actual_value(self.heap.peek(0)?)?;
        let right = self.heap.actual_value(self.heap.peek(1)?)?;

        let res = match (left, right) {
            (Value::Number(a), Value::Number(b)) => match inst {
                Inst::Add => Value::Number(a + b),
                Inst::Sub => Value::Number(a - b),
                Inst::Mul => Value::Number(a * b),
                Inst::Div => Value::Number(a / b),
                Inst::Greater => Value::Bool(a > b),
                _ => Value::Bool(a < b),
            },
            (Value::Object(a), Value::Object(b)) => match (inst, self.heap.object(a), self.heap.object(b)) {
                (Inst::Add, Object::Str(a), Object::Str(b)) => {
                    let text = format!("{}{}", a.text, b.text);
                    self.heap.alloc_str(&text)
                }
                (Inst::Add, Object::Array(a), Object::Array(b)) => {
                    let items = a.iter().chain(b).copied().collect();
                    Value::Object(self.heap.alloc(Object::Array(items)))
                }
                (Inst::Greater, Object::Str(a), Object::Str(b)) => Value::Bool(a.text > b.text),
                (Inst::Less, Object::Str(a), Object::Str(b)) => Value::Bool(a.text < b.text),
                _ => return Err(self.type_mismatch(inst, left, right)),
            },
            _ => return Err(self.type_mismatch(inst, left, right)),
        };
        self.heap.pop_n(2)?;
        self.heap.push(res)
    }

    fn exec_bitwise(&mut self, inst: Inst) -> Result<(), RuntimeError> {
        let left = self.heap.actual_value(self.heap.peek(0)?)?;
        let right = self.heap.actual_value(self.heap.peek(1)?)?;
        let (a, b) = match (left, right) {
            (Value::Number(a), Value::Number(b)) => (a as i64, b as i64),
            _ => return Err(self.type_mismatch(inst, left, right)),
        };
        let res = match inst {
            Inst::BitAnd => a & b,
            Inst::BitOr => a | b,
            _ => a ^ b,
        };
        self.heap.pop_n(2)?;
        self.heap.push(Value::Number(res as f64))
    }

    fn type_mismatch(&self, inst: Inst, left: Value, right: Value) -> RuntimeError {
        let op = match inst {
            Inst::Add => "+",
            Inst::Sub => "-",
            Inst::Mul => "*",
            Inst::Div => "/",
            Inst::Greater => ">",
            Inst::Less => "<",
            Inst::BitAnd => "&",
            Inst::BitOr => "|",
            _ => "^",
        };
        RuntimeError::TypeMismatch {
            op,
            left: self.heap.type_name(left),
            right: self.heap.type_name(right),
        }
    }

    /// Pops `[index, target]` and pushes the element.
    fn exec_get_index(&mut self) -> Result<(), RuntimeError> {
        let target = self.heap.actual_value(self.heap.peek(0)?)?;
        let index = self.heap.actual_value(self.heap.peek(1)?)?;

        let obj = match target {
            Value::Object(obj) => obj,
            v => return Err(RuntimeError::NotIndexable(self.heap.type_name(v))),
        };
        let v = match self.heap.object(obj) {
            Object::Array(items) => items[self.check_index(index, items.len())?],
            Object::Str(s) => {
                let len = s.text.chars().count();
                let idx = self.check_index(index, len)?;
                let ch: String = s.text.chars().skip(idx).take(1).collect();
                self.heap.alloc_str(&ch)
            }
            other => return Err(RuntimeError::NotIndexable(other.type_name())),
        };
        self.heap.pop_n(2)?;
        self.heap.push(v)
    }

    /// Pops `[index, target]` and stores the value below them into the element.
    fn exec_set_index(&mut self) -> Result<(), RuntimeError> {
        let target = self.heap.actual_value(self.heap.peek(0)?)?;
        let index = self.heap.actual_value(self.heap.peek(1)?)?;
        let value = self.heap.peek(2)?;

        let obj = match target {
            Value::Object(obj) => obj,
            v => return Err(RuntimeError::NotIndexable(self.heap.type_name(v))),
        };
        let len = match self.heap.object(obj) {
            Object::Array(items) => items.len(),
            Object::Str(_) => return Err(RuntimeError::NotIndexable("read-only string")),
            other => return Err(RuntimeError::NotIndexable(other.type_name())),
        };
        let idx = self.check_index(index, len)?;
        if let Object::Array(items) = self.heap.object_mut(obj) {
            items[idx] = value;
        }
        self.heap.pop_n(2)
    }

    /// Pops an index and pushes a reference to that element of the array
    /// stored at `place`.
    fn exec_ref_index(&mut self, place: RefTarget) -> Result<(), RuntimeError> {
        let index = self.heap.actual_value(self.heap.peek(0)?)?;
        let array = self.heap.actual_value(self.heap.read_target(place)?)?;
        let (obj, len) = match array {
            Value::Object(obj) => match self.heap.object(obj) {
                Object::Array(items) => (obj, items.len()),
                other => return Err(RuntimeError::NotIndexable(other.type_name())),
            },
            v => return Err(RuntimeError::NotIndexable(self.heap.type_name(v))),
        };
        let idx = self.check_index(index, len)?;
        let r = self.heap.alloc(Object::Ref(RefTarget::Element(obj, idx)));
        self.heap.pop()?;
        self.heap.push(Value::Object(r))
    }

    fn check_index(&self, index: Value, len: usize) -> Result<usize, RuntimeError> {
        match index {
            Value::Number(n) if n.fract() != 0.0 => Err(RuntimeError::InvalidIndex("fractional number")),
            Value::Number(n) if n < 0.0 || n >= len as f64 => {
                Err(RuntimeError::IndexOutOfRange { index: n, len })
            }
            Value::Number(n) => Ok(n as usize),
            v => Err(RuntimeError::InvalidIndex(self.heap.type_name(v))),
        }
    }

    fn member_key(&self, name: Value) -> Result<TableKey, RuntimeError> {
        match name {
            Value::Object(obj) => match self.heap.object(obj) {
                Object::Str(s) => Ok(TableKey::new(obj, s)),
                other => Err(RuntimeError::InvalidIndex(other.type_name())),
            },
            v => Err(RuntimeError::InvalidIndex(self.heap.type_name(v))),
        }
    }

    fn struct_table(&self, target: Value) -> Result<&Table, RuntimeError> {
        match target {
            Value::Object(obj) => match self.heap.object(obj) {
                Object::Struct(table) => Ok(table),
                other => Err(RuntimeError::NotAStruct(other.type_name())),
            },
            v => Err(RuntimeError::NotAStruct(self.heap.type_name(v))),
        }
    }

    /// Read a `(depth, index, is_upvalue)` operand triple and resolve it to
    /// an absolute stack slot.
    fn read_local_slot(&mut self) -> Result<usize, RuntimeError> {
        let depth = self.operand();
        let index = self.operand();
        let is_upvalue = self.operand() != 0;

        let frame = if is_upvalue {
            self.upvalue_frame(depth)?
        } else {
            self.heap
                .frames
                .last()
                .expect("no active call frame while executing")
        };
        Ok(frame.stack_base + index)
    }

    /// The frame owning an upvalue `depth` lexical levels out: the newest
    /// live activation of the function that encloses the running one
    /// `depth` times.
    fn upvalue_frame(&self, depth: usize) -> Result<&CallFrame, RuntimeError> {
        let frames = &self.heap.frames;
        let mut owner = frames
            .last()
            .expect("no active call frame while executing")
            .function;
        for _ in 0..depth {
            owner = match self.heap.get(owner) {
                Some(Object::Function(f)) => f.enclosing,
                _ => None,
            }
            .ok_or(RuntimeError::DanglingReference("enclosing function is gone"))?;
        }
        frames
            .iter()
            .rev()
            .find(|frame| frame.function == owner)
            .ok_or(RuntimeError::DanglingReference("upvalue frame is gone"))
    }

    /// The object standing for builtin `idx`, created on first use.
    fn builtin_object(&mut self, idx: usize) -> ObjectRef {
        if let Some(Some(obj)) = self.heap.builtin_cache.get(idx) {
            return *obj;
        }

        let (name, def) = match self.registry.borrow().get(idx) {
            Some((name, def)) => (name.clone(), def.clone()),
            None => panic!("corrupt bytecode: builtin {} is not registered", idx),
        };
        let payload = match def {
            BuiltinDef::Function(f) => BuiltinPayload::Function(f),
            BuiltinDef::Constant(c) => {
                let v = load_constant(&mut self.heap, &c);
                if let Value::Object(obj) = v {
                    self.heap.root(obj);
                }
                BuiltinPayload::Value(v)
            }
        };
        let pinned = matches!(payload, BuiltinPayload::Value(Value::Object(_)));
        let obj = self.heap.alloc(Object::Builtin(Builtin {
            name: Some(name),
            payload,
        }));
        if pinned {
            self.heap.unroot(1);
        }

        let cache = &mut self.heap.builtin_cache;
        if cache.len() <= idx {
            cache.resize(idx + 1, None);
        }
        cache[idx] = Some(obj);
        obj
    }

    /// Call the value sitting below the top `argc` values. Returns `true`
    /// if a frame was pushed, `false` if a native builtin already ran.
    fn call_value(&mut self, argc: usize) -> Result<bool, RuntimeError> {
        let callee = self.heap.actual_value(self.heap.peek(argc)?)?;
        let obj = match callee {
            Value::Object(obj) => obj,
            v => return Err(RuntimeError::NotCallable(self.heap.type_name(v))),
        };

        match self.heap.object(obj) {
            Object::Function(f) => {
                if f.param_count as usize != argc {
                    return Err(RuntimeError::ArityMismatch {
                        expected: f.param_count as usize,
                        got: argc,
                    });
                }
                trace!(name = ?f.name, argc, depth = self.heap.frames.len(), "call");
                let frame = CallFrame {
                    function: obj,
                    code: f.code.clone(),
                    constants: f.constants.clone(),
                    ip: 0,
                    stack_base: self.heap.stack.len() - argc,
                    local_count: f.local_count as usize,
                };
                let extra = f.local_count.saturating_sub(f.param_count) as usize;
                self.heap.push_frame(frame)?;
                self.heap.reserve_nils(extra)?;
                Ok(true)
            }
            Object::Builtin(Builtin {
                payload: BuiltinPayload::Function(native),
                name,
            }) => {
                let native = *native;
                trace!(name = ?name, argc, "call builtin");
                let mut args = self.heap.peek_n(argc)?.to_vec();
                let mut out = Value::Nil;
                let produced = native(&mut self.heap, &mut args, &mut out)?;
                self.heap.pop_n(argc + 1)?;
                if produced {
                    self.heap.push(out)?;
                }
                Ok(false)
            }
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }
}

/// Move a compiled function and everything in its constant pool into the
/// heap.
pub fn load_function(heap: &mut Heap, func: &Function) -> ObjectRef {
    let pinned = heap.temp_roots.len();
    let mut constants = Vec::with_capacity(func.constants.len());
    for c in &func.constants {
        let v = load_constant(heap, c);
        if let Value::Object(obj) = v {
            heap.root(obj);
        }
        constants.push(v);
    }
    let nested = constants.iter().filter_map(Value::as_object).collect::<Vec<_>>();
    let obj = heap.alloc(Object::Function(FunctionObject {
        name: func.name.clone(),
        enclosing: None,
        code: func.code.as_slice().into(),
        constants: constants.into(),
        param_count: func.param_count,
        local_count: func.local_count,
    }));
    for inner in nested {
        if let Object::Function(f) = heap.object_mut(inner) {
            f.enclosing = Some(obj);
        }
    }
    heap.temp_roots.truncate(pinned);
    obj
}

pub fn load_constant(heap: &mut Heap, c: &Constant) -> Value {
    match c {
        Constant::Nil => Value::Nil,
        Constant::Number(n) => Value::Number(*n),
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Str(s) => heap.alloc_str(s),
        Constant::Function(f) => Value::Object(load_function(heap, f)),
    }
}
