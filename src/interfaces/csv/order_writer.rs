use crate::domain::order::{Order, OrderStatus};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct OrderRow<'a> {
    order: &'a str,
    user: &'a str,
    pay_amount: Decimal,
    status: OrderStatus,
}

/// Writes the final order report as `order,user,pay_amount,status`.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes one row per order, sorted by order id so reports are stable.
    pub fn write_orders(&mut self, mut orders: Vec<Order>) -> Result<()> {
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        for order in &orders {
            self.writer.serialize(OrderRow {
                order: order.id.as_str(),
                user: order.user_id.as_str(),
                pay_amount: order.pay_amount.value(),
                status: order.status,
            })?;
        }
        if orders.is_empty() {
            self.writer
                .write_record(["order", "user", "pay_amount", "status"])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
