//! Connection commands (PING, ECHO)

use super::{Command, extract_bulk_string, wrong_arity};
use crate::protocol::RespValue;
use crate::store::Store;

/// PING command - Liveness check
///
/// Syntax: PING [message]
pub struct PingCommand;

impl Command for PingCommand {
    fn execute(&self, _store: &Store, args: &[RespValue]) -> RespValue {
        if !self.accepts(args.len()) {
            return wrong_arity(self.name());
        }

        match args.first() {
            None => RespValue::simple_string("PONG"),
            Some(arg) => match extract_bulk_string(arg) {
                Ok(message) => RespValue::bulk_string(message.clone()),
                Err(e) => RespValue::error(format!("ERR {}", e)),
            },
        }
    }

    fn name(&self) -> &'static str {
        "PING"
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// ECHO command - Return the given message
///
/// Syntax: ECHO message
pub struct EchoCommand;

impl Command for EchoCommand {
    fn execute(&self, _store: &Store, args: &[RespValue]) -> RespValue {
        if !self.accepts(args.len()) {
            return wrong_arity(self.name());
        }

        match extract_bulk_string(&args[0]) {
            Ok(message) => RespValue::bulk_string(message.clone()),
            Err(e) => RespValue::error(format!("ERR {}", e)),
        }
    }

    fn name(&self) -> &'static str {
        "ECHO"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}
