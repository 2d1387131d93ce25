//! Hash commands (HSET, HGET, HGETALL)

use super::{Command, extract_bulk_string, wrong_arity};
use crate::protocol::RespValue;
use crate::store::Store;

/// HSET command - Set field in the hash stored at key to value
///
/// Syntax: HSET key field value
///
/// Replies 1 if the field is new, 0 if an existing field was overwritten.
pub struct HSetCommand;

impl Command for HSetCommand {
    fn execute(&self, store: &Store, args: &[RespValue]) -> RespValue {
        if !self.accepts(args.len()) {
            return wrong_arity(self.name());
        }

        let key = match extract_bulk_string(&args[0]) {
            Ok(k) => k.clone(),
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        let field = match extract_bulk_string(&args[1]) {
            Ok(f) => f.clone(),
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        let value = match extract_bulk_string(&args[2]) {
            Ok(v) => v.clone(),
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        let added = store.hash_set(key, field, value);
        RespValue::integer(added as i64)
    }

    fn name(&self) -> &'static str {
        "HSET"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// HGET command - Get the value of a hash field
///
/// Syntax: HGET key field
pub struct HGetCommand;

impl Command for HGetCommand {
    fn execute(&self, store: &Store, args: &[RespValue]) -> RespValue {
        if !self.accepts(args.len()) {
            return wrong_arity(self.name());
        }

        let key = match extract_bulk_string(&args[0]) {
            Ok(k) => k,
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        let field = match extract_bulk_string(&args[1]) {
            Ok(f) => f,
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        match store.hash_get(key, field) {
            Some(v) => RespValue::bulk_string(v),
            None => RespValue::null(),
        }
    }

    fn name(&self) -> &'static str {
        "HGET"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// HGETALL command - Get all fields and values in a hash
///
/// Syntax: HGETALL key
pub struct HGetAllCommand;

impl Command for HGetAllCommand {
    fn execute(&self, store: &Store, args: &[RespValue]) -> RespValue {
        if !self.accepts(args.len()) {
            return wrong_arity(self.name());
        }

        let key = match extract_bulk_string(&args[0]) {
            Ok(k) => k,
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        let result = store
            .hash_get_all(key)
            .into_iter()
            .flat_map(|(field, value)| {
                [RespValue::bulk_string(field), RespValue::bulk_string(value)]
            })
            .collect();

        RespValue::array(result)
    }

    fn name(&self) -> &'static str {
        "HGETALL"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}
