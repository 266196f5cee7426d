use crate::codec::Codec;
use crate::command::{
    CommandArgs, CommandType, IntegerOutput, StatusOutput, ValueListOutput, ValueOutput,
};
use crate::connection::{CommandError, Connection, ResultStream};
use std::sync::Arc;

impl<C: Codec> Connection<C> {
    /// `GET key`
    pub fn get(
        &self,
        key: impl Into<C::Key>,
    ) -> Result<ResultStream<Option<C::Value>>, CommandError> {
        self.dispatch_with_args(
            CommandType::Get,
            ValueOutput::new(Arc::clone(self.codec())),
            CommandArgs::new().add_key(key),
        )
    }

    /// `SET key value`
    pub fn set(
        &self,
        key: impl Into<C::Key>,
        value: impl Into<C::Value>,
    ) -> Result<ResultStream<String>, CommandError> {
        self.dispatch_with_args(
            CommandType::Set,
            StatusOutput,
            CommandArgs::new().add_key(key).add_value(value),
        )
    }

    /// `DEL key [key ...]`
    pub fn del<I>(&self, keys: I) -> Result<ResultStream<i64>, CommandError>
    where
        I: IntoIterator,
        I::Item: Into<C::Key>,
    {
        self.dispatch_with_args(CommandType::Del, IntegerOutput, CommandArgs::new().add_keys(keys))
    }

    /// `INCR key`
    pub fn incr(&self, key: impl Into<C::Key>) -> Result<ResultStream<i64>, CommandError> {
        self.dispatch_with_args(CommandType::Incr, IntegerOutput, CommandArgs::new().add_key(key))
    }

    /// `MGET key [key ...]`
    pub fn mget<I>(&self, keys: I) -> Result<ResultStream<Vec<Option<C::Value>>>, CommandError>
    where
        I: IntoIterator,
        I::Item: Into<C::Key>,
    {
        self.dispatch_with_args(
            CommandType::Mget,
            ValueListOutput::new(Arc::clone(self.codec())),
            CommandArgs::new().add_keys(keys),
        )
    }
}
