use byteordered::byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ledger::{Amount, EventId, EventKind, WriteEvent};
use std::io::{Cursor, Read, Result, Write};
use tokio::io::{AsyncRead, AsyncWrite, AsyncReadExt as TokioAsyncReadExt, AsyncWriteExt as TokioAsyncWriteExt};

use crate::error::ClientError;
use crate::opcodes::*;

/// Wire protocol format:
/// 1. code (u16)
/// 2. event_id (i64) - write event id, or -1 for "no prior write"
/// 3. amount (i64) - minor units
/// 4. body_length (u32)
/// 5. body (bytes) - error text or stats JSON

const HEADER_SIZE: usize = 2 + 8 + 8 + 4; // code + event_id + amount + body_len
const MAX_BODY_SIZE: u32 = 64 * 1024; // 64 KiB

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub code: u16,
    pub event_id: i64,
    pub amount: i64,
    pub body: String,
}

impl Message {
    fn new(code: u16, event_id: i64, amount: Amount) -> Self {
        Message {
            code,
            event_id,
            amount: amount.minor(),
            body: String::new(),
        }
    }

    pub fn deposit(amount: Amount, event: EventId) -> Self {
        Self::new(OP_DEPOSIT, event.to_wire(), amount)
    }

    pub fn withdraw(amount: Amount, event: EventId) -> Self {
        Self::new(OP_WITHDRAW, event.to_wire(), amount)
    }

    pub fn query_balance(last_write: Option<EventId>) -> Self {
        Self::new(OP_QUERY_BALANCE, EventId::query_to_wire(last_write), Amount::ZERO)
    }

    pub fn propagate(event: &WriteEvent) -> Self {
        let code = match event.kind {
            EventKind::Deposit => OP_PROPAGATE_DEPOSIT,
            EventKind::Withdraw => OP_PROPAGATE_WITHDRAW,
        };
        Self::new(code, event.id.to_wire(), event.amount)
    }

    pub fn stats() -> Self {
        Self::new(OP_STATS, 0, Amount::ZERO)
    }

    pub fn ok(balance: Amount) -> Self {
        Self::new(OP_OK, 0, balance)
    }

    pub fn ok_with_body(body: String) -> Self {
        Message {
            body,
            ..Self::new(OP_OK, 0, Amount::ZERO)
        }
    }

    pub fn ack(event: EventId) -> Self {
        Self::new(OP_ACK, event.to_wire(), Amount::ZERO)
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Message {
            body: message.into(),
            ..Self::new(code, 0, Amount::ZERO)
        }
    }

    pub fn amount(&self) -> Amount {
        Amount::from_minor(self.amount)
    }

    /// Turn an error response into a `ClientError`, pass anything else through.
    pub fn into_result(self) -> std::result::Result<Message, ClientError> {
        if is_error_code(self.code) {
            Err(ClientError::from_response(self.code, self.body))
        } else {
            Ok(self)
        }
    }

    fn encode_header(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut header = [0u8; HEADER_SIZE];
        {
            let mut cursor = Cursor::new(&mut header[..]);
            WriteBytesExt::write_u16::<BigEndian>(&mut cursor, self.code)?;
            WriteBytesExt::write_i64::<BigEndian>(&mut cursor, self.event_id)?;
            WriteBytesExt::write_i64::<BigEndian>(&mut cursor, self.amount)?;
            WriteBytesExt::write_u32::<BigEndian>(&mut cursor, body_length(&self.body)?)?;
        }
        Ok(header)
    }

    fn decode_header(header: &[u8; HEADER_SIZE]) -> Result<(u16, i64, i64, u32)> {
        let mut cursor = Cursor::new(&header[..]);
        let code = ReadBytesExt::read_u16::<BigEndian>(&mut cursor)?;
        let event_id = ReadBytesExt::read_i64::<BigEndian>(&mut cursor)?;
        let amount = ReadBytesExt::read_i64::<BigEndian>(&mut cursor)?;
        let body_length = ReadBytesExt::read_u32::<BigEndian>(&mut cursor)?;

        // Validate body size to prevent OOM attacks
        if body_length > MAX_BODY_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("message too large: {} bytes (max: {} bytes)", body_length, MAX_BODY_SIZE),
            ));
        }
        Ok((code, event_id, amount, body_length))
    }

    /// Synchronous send for std::io::Write
    pub fn send<W: Write>(&self, stream: &mut W) -> Result<()> {
        let header = self.encode_header()?;
        stream.write_all(&header)?;
        stream.write_all(self.body.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    /// Synchronous receive for std::io::Read
    pub fn receive<R: Read>(stream: &mut R) -> Result<Message> {
        let mut header = [0u8; HEADER_SIZE];
        stream.read_exact(&mut header)?;
        let (code, event_id, amount, body_length) = Self::decode_header(&header)?;

        let mut body = vec![0u8; body_length as usize];
        stream.read_exact(&mut body)?;

        Ok(Message {
            code,
            event_id,
            amount,
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    /// Async send for tokio::io::AsyncWrite
    pub async fn send_async<W: AsyncWrite + Unpin + Send>(&self, stream: &mut W) -> Result<()> {
        let header = self.encode_header()?;
        TokioAsyncWriteExt::write_all(stream, &header).await?;
        TokioAsyncWriteExt::write_all(stream, self.body.as_bytes()).await?;
        TokioAsyncWriteExt::flush(stream).await?;
        Ok(())
    }

    /// Async receive for tokio::io::AsyncRead
    pub async fn receive_async<R: AsyncRead + Unpin + Send>(stream: &mut R) -> Result<Message> {
        let mut header = [0u8; HEADER_SIZE];
        TokioAsyncReadExt::read_exact(stream, &mut header).await?;
        let (code, event_id, amount, body_length) = Self::decode_header(&header)?;

        let mut body = vec![0u8; body_length as usize];
        TokioAsyncReadExt::read_exact(stream, &mut body).await?;

        Ok(Message {
            code,
            event_id,
            amount,
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }
}

fn body_length(body: &str) -> Result<u32> {
    u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_BODY_SIZE)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("message body too large: {} bytes", body.len()),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_frame_read_by_async_receiver() {
        let event = WriteEvent::withdraw(EventId(3), Amount::from_minor(30000)).unwrap();
        let mut buf = Vec::new();
        Message::propagate(&event).send(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let mut reader = &buf[..];
        let decoded = Message::receive_async(&mut reader).await.unwrap();
        assert_eq!(decoded.code, OP_PROPAGATE_WITHDRAW);
        assert_eq!(decoded.event_id, 3);
        assert_eq!(decoded.amount(), Amount::from_minor(30000));
    }

    #[test]
    fn test_query_carries_sentinel() {
        let mut buf = Vec::new();
        Message::query_balance(None).send(&mut buf).unwrap();
        let decoded = Message::receive(&mut &buf[..]).unwrap();
        assert_eq!(decoded.event_id, ledger::NO_PRIOR_WRITE);
    }

    #[test]
    fn test_oversized_body_rejected() {
        let mut buf = Vec::new();
        WriteBytesExt::write_u16::<BigEndian>(&mut buf, OP_OK).unwrap();
        WriteBytesExt::write_i64::<BigEndian>(&mut buf, 0).unwrap();
        WriteBytesExt::write_i64::<BigEndian>(&mut buf, 0).unwrap();
        WriteBytesExt::write_u32::<BigEndian>(&mut buf, MAX_BODY_SIZE + 1).unwrap();

        let err = Message::receive(&mut &buf[..]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_error_response_maps_to_client_error() {
        let response = Message::error(OP_ERR_INSUFFICIENT_FUNDS, "balance 7.00");
        assert!(matches!(response.into_result(), Err(ClientError::InsufficientFunds(_))));

        let response = Message::error(OP_ERR_DUPLICATE_EVENT, "event 1");
        assert!(matches!(
            response.into_result(),
            Err(ClientError::Rejected { code: OP_ERR_DUPLICATE_EVENT, .. })
        ));

        assert!(Message::ok(Amount::ZERO).into_result().is_ok());
    }
}
