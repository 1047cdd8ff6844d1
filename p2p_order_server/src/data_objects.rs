use std::fmt::Display;

use chrono::{DateTime, Utc};
use p2p_order_engine::{
    auction::{PoolFilter, PoolSort},
    db_types::OrderStatusType,
    traits::OrderQueryFilter,
};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

/// Query parameters for `GET /orders`. Query strings cannot carry lists, so `status` is a comma-separated list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderSearchQuery {
    pub user_id: Option<String>,
    pub merchant_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

impl Display for OrderSearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(user_id) = &self.user_id {
            parts.push(format!("user_id={user_id}"));
        }
        if let Some(merchant_id) = &self.merchant_id {
            parts.push(format!("merchant_id={merchant_id}"));
        }
        if let Some(since) = &self.since {
            parts.push(format!("since={since}"));
        }
        if let Some(until) = &self.until {
            parts.push(format!("until={until}"));
        }
        if let Some(status) = &self.status {
            parts.push(format!("status={status}"));
        }
        write!(f, "{}", parts.join(", "))
    }
}

impl TryFrom<OrderSearchQuery> for OrderQueryFilter {
    type Error = ServerError;

    fn try_from(query: OrderSearchQuery) -> Result<Self, Self::Error> {
        let status = query
            .status
            .as_deref()
            .map(|list| {
                comma_list(list)
                    .map(|s| s.parse::<OrderStatusType>().map_err(|e| ServerError::InvalidRequestQuery(e.to_string())))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        Ok(OrderQueryFilter {
            user_id: query.user_id,
            merchant_id: query.merchant_id,
            since: query.since,
            until: query.until,
            status,
        })
    }
}

/// Query parameters for `GET /mempool`, e.g. `?sort=premium_desc&filter=mineable,high_premium`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolQuery {
    #[serde(default)]
    pub sort: PoolSort,
    pub filter: Option<String>,
}

impl PoolQuery {
    pub fn filters(&self) -> Result<Vec<PoolFilter>, ServerError> {
        let Some(list) = self.filter.as_deref() else {
            return Ok(Vec::new());
        };
        comma_list(list)
            .map(|name| {
                serde_json::from_value::<PoolFilter>(serde_json::Value::String(name.to_string()))
                    .map_err(|_| ServerError::InvalidRequestQuery(format!("{name} is not a pool filter")))
            })
            .collect()
    }
}

fn comma_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_lists_are_split() {
        let query = OrderSearchQuery {
            merchant_id: Some("m1".into()),
            status: Some("pending, accepted".into()),
            ..Default::default()
        };
        assert_eq!(query.to_string(), "merchant_id=m1, status=pending, accepted");
        let filter = OrderQueryFilter::try_from(query).unwrap();
        assert_eq!(filter.status, Some(vec![OrderStatusType::Pending, OrderStatusType::Accepted]));
        assert_eq!(filter.merchant_id.as_deref(), Some("m1"));

        let query = OrderSearchQuery { status: Some("pending,lost".into()), ..Default::default() };
        assert!(matches!(OrderQueryFilter::try_from(query), Err(ServerError::InvalidRequestQuery(_))));
    }

    #[test]
    fn pool_filters() {
        let query = PoolQuery { sort: PoolSort::PremiumDesc, filter: Some("mineable,high_premium,".into()) };
        assert_eq!(query.filters().unwrap(), vec![PoolFilter::Mineable, PoolFilter::HighPremium]);
        assert!(PoolQuery::default().filters().unwrap().is_empty());
        let query = PoolQuery { sort: PoolSort::default(), filter: Some("cheap".into()) };
        assert!(query.filters().is_err());
    }
}
