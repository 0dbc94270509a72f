use std::fmt::Write;

use fnv::FnvHashSet;
use quill_bytecode::format_number;

use super::{Builtin, BuiltinPayload, Object, Value};
use crate::gc::alloc::Heap;

/// Nesting depth after which containers print as `...`.
const MAX_DISPLAY_DEPTH: usize = 16;

impl Heap {
    pub fn type_name(&self, v: Value) -> &'static str {
        match v {
            Value::Nil => "nil",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Object(obj) => self.get(obj).map_or("freed object", Object::type_name),
        }
    }

    /// Compare two already dereferenced values. Strings compare by content,
    /// arrays element-wise and every other object by identity.
    pub fn values_equal(&self, a: Value, b: Value) -> bool {
        // Each pair of objects is expanded once, so cyclic arrays terminate.
        let mut seen = FnvHashSet::default();
        let mut work = vec![(a, b)];
        while let Some(pair) = work.pop() {
            let (x, y) = match pair {
                (Value::Object(x), Value::Object(y)) => (x, y),
                (a, b) if a == b => continue,
                _ => return false,
            };
            if x == y || !seen.insert((x, y)) {
                continue;
            }
            match (self.get(x), self.get(y)) {
                (Some(Object::Str(s)), Some(Object::Str(t))) if s == t => {}
                (Some(Object::Array(xs)), Some(Object::Array(ys))) if xs.len() == ys.len() => {
                    work.extend(xs.iter().copied().zip(ys.iter().copied()))
                }
                _ => return false,
            }
        }
        true
    }

    /// Render a value the way `print` shows it.
    pub fn display(&self, v: Value) -> String {
        let mut out = String::new();
        self.write_value(&mut out, v, 0);
        out
    }

    fn write_value(&self, out: &mut String, v: Value, depth: usize) {
        let v = self.actual_value(v).unwrap_or(v);
        let obj = match v {
            Value::Nil => return out.push_str("nil"),
            Value::Number(n) => return out.push_str(&format_number(n)),
            Value::Bool(b) => return out.push_str(if b { "true" } else { "false" }),
            Value::Object(obj) => obj,
        };
        let obj = match self.get(obj) {
            Some(obj) => obj,
            None => return out.push_str("<freed>"),
        };
        if depth > MAX_DISPLAY_DEPTH {
            return out.push_str("...");
        }

        match obj {
            Object::Str(s) if depth == 0 => out.push_str(&s.text),
            Object::Str(s) => {
                let _ = write!(out, "{:?}", s.text.as_str());
            }
            Object::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_value(out, *item, depth + 1);
                }
                out.push(']');
            }
            Object::Struct(table) => {
                out.push('{');
                for (i, (key, value)) in table.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}: ", key.text);
                    self.write_value(out, value, depth + 1);
                }
                out.push('}');
            }
            Object::Ref(_) => out.push_str("<ref>"),
            Object::Function(f) => match &f.name {
                Some(name) => {
                    let _ = write!(out, "<function {}>", name);
                }
                None => out.push_str("<function>"),
            },
            Object::Builtin(Builtin { name, payload }) => {
                let kind = match payload {
                    BuiltinPayload::Function(_) => "builtin",
                    _ => "native data",
                };
                match name {
                    Some(name) => {
                        let _ = write!(out, "<{} {}>", kind, name);
                    }
                    None => {
                        let _ = write!(out, "<{}>", kind);
                    }
                }
            }
        }
    }
}
