use super::{RuntimeError, Value};

/// Host functions a script template can expose to its scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Println,
    Len,
    Fail,
}

impl Builtin {
    pub const ALL: [Builtin; 3] = [Builtin::Println, Builtin::Len, Builtin::Fail];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Println => "println",
            Builtin::Len => "len",
            Builtin::Fail => "fail",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    pub fn arity(self) -> usize {
        1
    }

    pub fn call(self, args: Vec<Value>, output: &mut Vec<String>) -> Result<Value, RuntimeError> {
        if args.len() != self.arity() {
            return Err(RuntimeError::ArityMismatch {
                name: self.name().to_string(),
                expected: self.arity(),
                found: args.len(),
            });
        }
        match (self, &args[0]) {
            (Builtin::Println, value) => {
                output.push(value.to_string());
                Ok(Value::Unit)
            }
            (Builtin::Len, Value::List(items)) => Ok(Value::Int(items.len() as i64)),
            (Builtin::Len, other) => Err(RuntimeError::Builtin {
                builtin: self.name(),
                message: format!("expected a list, found {}", other.type_name()),
            }),
            (Builtin::Fail, message) => Err(RuntimeError::Failure {
                message: message.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn println_captures_display_form() {
        let mut output = Vec::new();
        let result = Builtin::Println
            .call(vec![Value::Str("hello".to_string())], &mut output)
            .unwrap();
        assert_eq!(result, Value::Unit);
        assert_eq!(output, vec!["hello".to_string()]);
    }

    #[test]
    fn len_counts_list_items() {
        let mut output = Vec::new();
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(Builtin::Len.call(vec![list], &mut output), Ok(Value::Int(2)));
    }

    #[test]
    fn len_rejects_strings() {
        let mut output = Vec::new();
        let error = Builtin::Len
            .call(vec![Value::Str("abc".to_string())], &mut output)
            .unwrap_err();
        assert!(error.to_string().contains("expected a list, found string"));
    }

    #[test]
    fn fail_raises_a_runtime_failure() {
        let mut output = Vec::new();
        let error = Builtin::Fail
            .call(vec![Value::Str("nope".to_string())], &mut output)
            .unwrap_err();
        assert_eq!(error.to_string(), "Script failed: nope");
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Builtin::from_name("len"), Some(Builtin::Len));
        assert_eq!(Builtin::from_name("print"), None);
    }
}
