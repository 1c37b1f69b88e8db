use std::time::Duration;

use ledger::{Amount, EventId, WriteEvent};
use log::debug;
use tokio::net::TcpStream;

use crate::error::ClientError;
use crate::message::Message;
use crate::opcodes::*;

/// Async connection to a single branch node.
///
/// Requests are strictly request/response on one connection, so a pending
/// balance query occupies the connection until it resolves.
pub struct BranchClient {
    stream: TcpStream,
}

impl BranchClient {
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, ClientError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout(addr.to_string()))??;
        stream.set_nodelay(true)?;
        debug!("Connected to branch at {}", addr);

        Ok(BranchClient { stream })
    }

    /// Send one request and read its response, mapping error frames.
    pub async fn call(&mut self, request: &Message) -> Result<Message, ClientError> {
        request.send_async(&mut self.stream).await?;
        Message::receive_async(&mut self.stream).await?.into_result()
    }

    pub async fn deposit(&mut self, amount: Amount, event: EventId) -> Result<Amount, ClientError> {
        let response = self.call(&Message::deposit(amount, event)).await?;
        expect_code(&response, OP_OK)?;
        Ok(response.amount())
    }

    pub async fn withdraw(&mut self, amount: Amount, event: EventId) -> Result<Amount, ClientError> {
        let response = self.call(&Message::withdraw(amount, event)).await?;
        expect_code(&response, OP_OK)?;
        Ok(response.amount())
    }

    pub async fn query_balance(&mut self, last_write: Option<EventId>) -> Result<Amount, ClientError> {
        let response = self.call(&Message::query_balance(last_write)).await?;
        expect_code(&response, OP_OK)?;
        Ok(response.amount())
    }

    /// Replay `event` on the remote branch. Success means it is applied there.
    pub async fn propagate(&mut self, event: &WriteEvent) -> Result<(), ClientError> {
        let response = self.call(&Message::propagate(event)).await?;
        expect_code(&response, OP_ACK)
    }

    /// Node stats as a JSON document.
    pub async fn stats(&mut self) -> Result<String, ClientError> {
        let response = self.call(&Message::stats()).await?;
        expect_code(&response, OP_OK)?;
        Ok(response.body)
    }
}

fn expect_code(response: &Message, code: u16) -> Result<(), ClientError> {
    if response.code == code {
        Ok(())
    } else {
        Err(ClientError::UnexpectedResponse(response.code))
    }
}
