use std::collections::HashSet;
use std::fs;
use std::path::Path;

use ledger::{Amount, EventId};
use log::{info, warn};
use protocol::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commands::{RESULT_ERROR, RESULT_SUCCESS};
use crate::error::CtlError;
use crate::session::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Deposit,
    Withdraw,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deposit(Amount),
    Withdraw(Amount),
    Query,
}

impl Operation {
    fn interface(&self) -> Interface {
        match self {
            Operation::Deposit(_) => Interface::Deposit,
            Operation::Withdraw(_) => Interface::Withdraw,
            Operation::Query => Interface::Query,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: EventId,
    pub branch: u32,
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: i64,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct RawCustomer {
    id: i64,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: u64,
    interface: Interface,
    branch: u32,
    #[serde(default)]
    money: Option<serde_json::Number>,
}

/// Customers to replay, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub customers: Vec<Customer>,
}

impl Scenario {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CtlError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parse the scenario list. Entries whose `type` is not `customer` are
    /// skipped, so a combined branch/customer file can be used as is.
    pub fn from_json_str(content: &str) -> Result<Self, CtlError> {
        let entries: Vec<Value> = serde_json::from_str(content)?;

        let mut customers = Vec::new();
        let mut write_ids = HashSet::new();
        for entry in entries {
            if entry.get("type").and_then(Value::as_str) != Some("customer") {
                continue;
            }
            let raw: RawCustomer = serde_json::from_value(entry)?;

            let mut steps = Vec::with_capacity(raw.events.len());
            for event in raw.events {
                let step = Step::from_raw(raw.id, event)?;
                if step.operation != Operation::Query && !write_ids.insert(step.id) {
                    return Err(CtlError::InvalidScenario(format!(
                        "event id {} is used by more than one write",
                        step.id
                    )));
                }
                steps.push(step);
            }
            customers.push(Customer { id: raw.id, steps });
        }

        Ok(Scenario { customers })
    }
}

impl Step {
    fn from_raw(customer: i64, event: RawEvent) -> Result<Self, CtlError> {
        if event.branch == 0 {
            return Err(CtlError::InvalidScenario(format!(
                "customer {} event {} addresses branch 0",
                customer, event.id
            )));
        }

        let operation = match event.interface {
            Interface::Query => Operation::Query,
            Interface::Deposit => Operation::Deposit(money(customer, &event)?),
            Interface::Withdraw => Operation::Withdraw(money(customer, &event)?),
        };

        Ok(Step {
            id: EventId::new(event.id)?,
            branch: event.branch,
            operation,
        })
    }
}

fn money(customer: i64, event: &RawEvent) -> Result<Amount, CtlError> {
    let raw = event.money.as_ref().ok_or_else(|| {
        CtlError::InvalidScenario(format!("customer {} event {} has no money", customer, event.id))
    })?;
    let amount: Amount = raw.to_string().parse()?;
    if !amount.is_positive() {
        return Err(CtlError::InvalidScenario(format!(
            "customer {} event {} has non-positive money {}",
            customer, event.id, amount
        )));
    }
    Ok(amount)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub interface: Interface,
    pub branch: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerOutput {
    pub id: i64,
    pub recv: Vec<Reply>,
}

/// Replay every customer's steps in order. Each query carries the id of
/// that customer's last successful write, so it observes that write.
pub fn replay<T: Transport>(scenario: &Scenario, transport: &mut T) -> Vec<CustomerOutput> {
    scenario
        .customers
        .iter()
        .map(|customer| replay_customer(customer, transport))
        .collect()
}

fn replay_customer<T: Transport>(customer: &Customer, transport: &mut T) -> CustomerOutput {
    let mut last_write: Option<EventId> = None;
    let mut recv = Vec::with_capacity(customer.steps.len());

    for step in &customer.steps {
        let message = match step.operation {
            Operation::Deposit(amount) => Message::deposit(amount, step.id),
            Operation::Withdraw(amount) => Message::withdraw(amount, step.id),
            Operation::Query => Message::query_balance(last_write),
        };

        let outcome = transport.call(step.branch, &message);
        if let Err(e) = &outcome {
            warn!(
                "Customer {} event {} ({:?}) on branch {} failed: {}",
                customer.id,
                step.id,
                step.operation.interface(),
                step.branch,
                e
            );
        }

        let reply = match (step.operation, outcome) {
            (Operation::Query, Ok(response)) => Reply {
                interface: Interface::Query,
                branch: step.branch,
                result: None,
                balance: Some(response.amount()),
            },
            (Operation::Query, Err(_)) => Reply {
                interface: Interface::Query,
                branch: step.branch,
                result: Some(RESULT_ERROR),
                balance: None,
            },
            (operation, Ok(_)) => {
                last_write = Some(step.id);
                Reply {
                    interface: operation.interface(),
                    branch: step.branch,
                    result: Some(RESULT_SUCCESS),
                    balance: None,
                }
            }
            (operation, Err(_)) => Reply {
                interface: operation.interface(),
                branch: step.branch,
                result: Some(RESULT_ERROR),
                balance: None,
            },
        };
        recv.push(reply);
    }

    info!("Customer {} replayed {} events", customer.id, recv.len());
    CustomerOutput { id: customer.id, recv }
}

pub fn write_output<P: AsRef<Path>>(path: P, output: &[CustomerOutput]) -> Result<(), CtlError> {
    let json = serde_json::to_string_pretty(output)?;
    fs::write(path, json)?;
    Ok(())
}
