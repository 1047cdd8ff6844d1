use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Actor, ActorType, MempoolEntry, Order, OrderStatusType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub user_id: Option<String>,
    /// Matches either `merchant_id` or `buyer_merchant_id`
    pub merchant_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
}

impl OrderQueryFilter {
    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_merchant_id<S: Into<String>>(mut self, merchant_id: S) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    /// Restricts the search to orders where `actor` is a party. Compliance and system actors see everything.
    pub fn with_party(self, actor: Actor) -> Self {
        match actor.kind {
            ActorType::User => self.with_user_id(actor.id),
            ActorType::Merchant => self.with_merchant_id(actor.id),
            ActorType::Compliance | ActorType::System => self,
        }
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() &&
            self.merchant_id.is_none() &&
            self.status.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters");
        }
        if let Some(user_id) = &self.user_id {
            write!(f, "user_id: {user_id}. ")?;
        }
        if let Some(merchant_id) = &self.merchant_id {
            write!(f, "merchant_id: {merchant_id}. ")?;
        }
        if let Some(status) = &self.status {
            let s = status.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(",");
            write!(f, "status: [{s}]. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since: {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until: {until}. ")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BumpResult {
    pub entry: MempoolEntry,
    /// False if the entry was already at its cap and nothing changed
    pub bumped: bool,
}

impl BumpResult {
    pub fn max_reached(&self) -> bool {
        self.entry.max_reached()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpiryResult {
    pub expired: Vec<Order>,
    /// Orders that were due but could not be expired, with the reason
    pub failed: Vec<(Order, String)>,
}

impl ExpiryResult {
    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}
