use crate::domain::money::Amount;
use crate::domain::order::{MerchantId, Order, OrderId, UserId};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of an order seed file: `order,merchant,user,total,pay_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderRecord {
    pub order: String,
    pub merchant: String,
    pub user: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub pay_amount: Decimal,
}

impl OrderRecord {
    /// Builds a `CREATED` order; rejects non-positive amounts and `pay_amount > total`.
    pub fn into_order(self, now: DateTime<Utc>) -> Result<Order> {
        if self.order.is_empty() || self.user.is_empty() {
            return Err(PaymentError::ValidationError(
                "order and user ids must not be empty".to_string(),
            ));
        }
        Order::new(
            OrderId::new(self.order),
            MerchantId::new(self.merchant),
            UserId::new(self.user),
            Amount::new(self.total)?,
            Amount::new(self.pay_amount)?,
            now,
        )
    }
}

/// Reads order records from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<OrderRecord>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct OrderReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OrderReader<R> {
    /// Creates a new `OrderReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes order records.
    pub fn records(self) -> impl Iterator<Item = Result<OrderRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
