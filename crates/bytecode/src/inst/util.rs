use crate::inst::Inst;

/// Something instructions can be read from, one word at a time.
pub trait InstContainer {
    fn seek(&mut self, offset: usize);
    fn read_word(&mut self) -> i32;

    /// Read an opcode word.
    ///
    /// # Panics
    ///
    /// Panics if the word is not a valid opcode. Compiled code never contains one.
    fn read_inst(&mut self) -> Inst {
        let word = self.read_word();
        Inst::from_word(word).unwrap_or_else(|| panic!("corrupt bytecode: invalid opcode {}", word))
    }

    /// Read an operand word that is used as an index or count.
    fn read_operand(&mut self) -> usize {
        let word = self.read_word();
        usize::try_from(word)
            .unwrap_or_else(|_| panic!("corrupt bytecode: negative operand {}", word))
    }
}

pub trait InstContainerMut {
    fn write_word(&mut self, v: i32);

    /// Offset of the next word to be written.
    fn position(&self) -> usize;

    /// Overwrite a previously written word.
    fn patch(&mut self, offset: usize, v: i32);

    fn emit(&mut self, i: Inst) -> &mut Self {
        debug_assert_eq!(i.arity(), 0, "{} takes operands", i);
        self.write_word(i.word());
        self
    }

    fn emit_p(&mut self, i: Inst, params: &[i32]) -> &mut Self {
        debug_assert_eq!(
            i.arity(),
            params.len(),
            "{} takes {} operands",
            i,
            i.arity()
        );
        self.write_word(i.word());
        for &p in params {
            self.write_word(p);
        }
        self
    }
}

impl InstContainerMut for Vec<i32> {
    fn write_word(&mut self, v: i32) {
        self.push(v);
    }

    fn position(&self) -> usize {
        self.len()
    }

    fn patch(&mut self, offset: usize, v: i32) {
        self[offset] = v;
    }
}

/// A cursor over an instruction slice.
#[derive(Debug, Clone)]
pub struct InstCursor<'a> {
    code: &'a [i32],
    ip: usize,
}

impl<'a> InstCursor<'a> {
    pub fn new(code: &'a [i32]) -> Self {
        InstCursor { code, ip: 0 }
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn is_at_end(&self) -> bool {
        self.ip >= self.code.len()
    }
}

impl InstContainer for InstCursor<'_> {
    fn seek(&mut self, offset: usize) {
        self.ip = offset;
    }

    fn read_word(&mut self) -> i32 {
        let word = *self
            .code
            .get(self.ip)
            .expect("corrupt bytecode: read past the end of the instruction stream");
        self.ip += 1;
        word
    }
}
