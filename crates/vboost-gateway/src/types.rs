//! Account and order types exchanged with the trading gateway.

use std::fmt;

use vboost_core::{CorrelationId, Price, Size};

/// Identity of one trading sub-account plus its web session.
#[derive(Clone)]
pub struct AccountCredentials {
    /// Display name used in logs.
    pub name: String,
    pub main_account_id: String,
    pub sub_account_id: String,
    /// Opaque session token sent as the `gravity` cookie.
    pub session_cookie: String,
}

impl AccountCredentials {
    pub fn new(
        name: impl Into<String>,
        main_account_id: impl Into<String>,
        sub_account_id: impl Into<String>,
        session_cookie: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            main_account_id: main_account_id.into(),
            sub_account_id: sub_account_id.into(),
            session_cookie: session_cookie.into(),
        }
    }
}

// The session cookie grants full account access; keep it out of logs.
impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("name", &self.name)
            .field("main_account_id", &self.main_account_id)
            .field("sub_account_id", &self.sub_account_id)
            .field("session_cookie", &"<redacted>")
            .finish()
    }
}

/// Venue acknowledgement of `create_order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderAck {
    /// Venue order id. `None` when the venue returned a placeholder.
    pub order_id: Option<String>,
    /// Client correlation id sent with the order.
    pub correlation_id: CorrelationId,
}

impl CreateOrderAck {
    pub fn new(order_id: Option<String>, correlation_id: CorrelationId) -> Self {
        Self {
            order_id: order_id.filter(|id| is_real_order_id(id)),
            correlation_id,
        }
    }
}

/// The venue acknowledges some orders with `0x00` before assigning an id.
pub fn is_real_order_id(id: &str) -> bool {
    !matches!(id, "" | "0" | "0x00")
}

/// An order still resting on the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOrder {
    pub order_id: String,
    pub instrument: Option<String>,
    pub correlation_id: Option<CorrelationId>,
    pub size: Option<Size>,
    pub price: Option<Price>,
    pub is_buying: Option<bool>,
}

impl OpenOrder {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            instrument: None,
            correlation_id: None,
            size: None,
            price: None,
            is_buying: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_order_id_dropped() {
        let cid = CorrelationId(7);
        assert_eq!(CreateOrderAck::new(Some("0x00".into()), cid).order_id, None);
        assert_eq!(CreateOrderAck::new(Some(String::new()), cid).order_id, None);
        assert_eq!(
            CreateOrderAck::new(Some("0xabc".into()), cid).order_id.as_deref(),
            Some("0xabc")
        );
    }

    #[test]
    fn test_debug_redacts_cookie() {
        let acc = AccountCredentials::new("A", "main", "123", "secret-token");
        let dbg = format!("{acc:?}");
        assert!(!dbg.contains("secret-token"));
        assert!(dbg.contains("123"));
    }
}
