use crate::codec::Codec;
use crate::command::{CommandArgs, CommandType, IntegerOutput, PushOutput};
use crate::connection::{CommandError, Connection, ResultStream};
use crate::protocol::RespValue;

impl<C: Codec> Connection<C> {
    /// `PUBLISH channel message`, yielding the number of receivers.
    pub fn publish(
        &self,
        channel: impl Into<C::Key>,
        message: impl Into<C::Value>,
    ) -> Result<ResultStream<i64>, CommandError> {
        self.dispatch_with_args(
            CommandType::Publish,
            IntegerOutput,
            CommandArgs::new().add_key(channel).add_value(message),
        )
    }

    /// `SUBSCRIBE channel [channel ...]`
    ///
    /// The stream never completes: it yields the subscription confirmations
    /// and then every pushed message frame. Once subscribed, the server
    /// rejects ordinary commands on this connection: their error replies go
    /// to the rejected command's stream and the subscription keeps running.
    pub fn subscribe<I>(&self, channels: I) -> Result<ResultStream<RespValue>, CommandError>
    where
        I: IntoIterator,
        I::Item: Into<C::Key>,
    {
        self.dispatch_with_args(
            CommandType::Subscribe,
            PushOutput,
            CommandArgs::new().add_keys(channels),
        )
    }
}
