//! String commands (SET, GET)

use super::{Command, extract_bulk_string, wrong_arity};
use crate::protocol::RespValue;
use crate::store::Store;

/// SET command - Set a key to a value
///
/// Syntax: SET key value
pub struct SetCommand;

impl Command for SetCommand {
    fn execute(&self, store: &Store, args: &[RespValue]) -> RespValue {
        if !self.accepts(args.len()) {
            return wrong_arity(self.name());
        }

        // Extract key and value
        let key = match extract_bulk_string(&args[0]) {
            Ok(k) => k.clone(),
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        let value = match extract_bulk_string(&args[1]) {
            Ok(v) => v.clone(),
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        store.string_set(key, value);

        RespValue::simple_string("OK")
    }

    fn name(&self) -> &'static str {
        "SET"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// GET command - Get the value of a key
///
/// Syntax: GET key
pub struct GetCommand;

impl Command for GetCommand {
    fn execute(&self, store: &Store, args: &[RespValue]) -> RespValue {
        if !self.accepts(args.len()) {
            return wrong_arity(self.name());
        }

        let key = match extract_bulk_string(&args[0]) {
            Ok(k) => k,
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        match store.string_get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    fn name(&self) -> &'static str {
        "GET"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_set_get() {
        let store = Store::new();

        let args = vec![
            RespValue::bulk_string("mykey"),
            RespValue::bulk_string("myvalue"),
        ];
        let result = SetCommand.execute(&store, &args);
        assert_eq!(result, RespValue::simple_string("OK"));

        let args = vec![RespValue::bulk_string("mykey")];
        let result = GetCommand.execute(&store, &args);
        assert_eq!(result, RespValue::bulk_string(Bytes::from("myvalue")));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = Store::new();

        let args = vec![RespValue::bulk_string("nonexistent")];
        let result = GetCommand.execute(&store, &args);
        assert_eq!(result, RespValue::null());
    }

    #[test]
    fn test_non_bulk_argument_is_rejected() {
        let store = Store::new();

        let args = vec![RespValue::integer(1), RespValue::bulk_string("v")];
        let result = SetCommand.execute(&store, &args);
        assert!(result.is_error());
        assert_eq!(store.stats().string_keys, 0);
    }
}
