use crate::codec::Codec;
use crate::command::{CommandArgs, CommandType, IntegerOutput, StatusOutput, ValueOutput};
use crate::connection::{CommandError, Connection, ResultStream};
use std::sync::Arc;

impl<C: Codec> Connection<C> {
    /// `PING`
    pub fn ping(&self) -> Result<ResultStream<String>, CommandError> {
        self.dispatch(CommandType::Ping, StatusOutput)
    }

    /// `ECHO message`
    pub fn echo(
        &self,
        message: impl Into<C::Value>,
    ) -> Result<ResultStream<Option<C::Value>>, CommandError> {
        self.dispatch_with_args(
            CommandType::Echo,
            ValueOutput::new(Arc::clone(self.codec())),
            CommandArgs::new().add_value(message),
        )
    }

    /// `DBSIZE`
    pub fn dbsize(&self) -> Result<ResultStream<i64>, CommandError> {
        self.dispatch(CommandType::Dbsize, IntegerOutput)
    }
}
