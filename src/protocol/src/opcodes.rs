// Operation codes for the wire protocol

// Client operations
pub const OP_DEPOSIT: u16 = 1;
pub const OP_WITHDRAW: u16 = 2;
pub const OP_QUERY_BALANCE: u16 = 3;

// Replication operations (branch → branch)
pub const OP_PROPAGATE_DEPOSIT: u16 = 4;
pub const OP_PROPAGATE_WITHDRAW: u16 = 5;

// Stats and status
pub const OP_STATS: u16 = 9;

// Responses
pub const OP_OK: u16 = 100;            // amount = balance, body = payload if any
pub const OP_ACK: u16 = 101;           // propagation applied (or already applied)

// Error responses, body carries the message
pub const OP_ERR_INSUFFICIENT_FUNDS: u16 = 200;
pub const OP_ERR_INVALID: u16 = 201;
pub const OP_ERR_DUPLICATE_EVENT: u16 = 202;
pub const OP_ERR_AWAIT_TIMEOUT: u16 = 203;
pub const OP_ERR_UNKNOWN_OP: u16 = 204;
pub const OP_ERR_INTERNAL: u16 = 205;

pub fn is_error_code(code: u16) -> bool {
    (OP_ERR_INSUFFICIENT_FUNDS..=OP_ERR_INTERNAL).contains(&code)
}
