use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BrokerOrderType {
    Market,
    Limit,
}

/// `D` = delivery/cash, `I` = intraday/margin (spec glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Product {
    D,
    I,
}

/// One of the four automation actions a rule can fire (spec §3, "Action
/// Configurations").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    PlaceOrder {
        symbol: String,
        transaction_type: TransactionType,
        quantity: Decimal,
        order_type: BrokerOrderType,
        product: Product,
        /// Required for `Limit`, must be absent/null for `Market`.
        price: Option<Decimal>,
    },
    CancelOrder {
        order_id: String,
    },
    ModifyOrder {
        order_id: String,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    },
    /// Used by OCO: when one exit rule fires, it cancels its peer.
    CancelRule {
        rule_id: i64,
    },
}

impl ActionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            ActionConfig::PlaceOrder {
                symbol,
                quantity,
                order_type,
                price,
                ..
            } => {
                if symbol.trim().is_empty() {
                    anyhow::bail!("place_order requires a non-empty symbol");
                }
                if *quantity <= Decimal::ZERO {
                    anyhow::bail!("place_order quantity must be positive");
                }
                match (order_type, price) {
                    (BrokerOrderType::Limit, None) => {
                        anyhow::bail!("place_order with LIMIT order_type requires a price")
                    }
                    (BrokerOrderType::Market, Some(_)) => {
                        anyhow::bail!("place_order with MARKET order_type must not set a price")
                    }
                    _ => Ok(()),
                }
            }
            ActionConfig::CancelOrder { order_id } => {
                if order_id.trim().is_empty() {
                    anyhow::bail!("cancel_order requires a non-empty order_id");
                }
                Ok(())
            }
            ActionConfig::ModifyOrder {
                order_id,
                price,
                quantity,
                ..
            } => {
                if order_id.trim().is_empty() {
                    anyhow::bail!("modify_order requires a non-empty order_id");
                }
                if price.is_none() && quantity.is_none() {
                    anyhow::bail!("modify_order requires at least one of price/quantity");
                }
                Ok(())
            }
            ActionConfig::CancelRule { rule_id } => {
                if *rule_id <= 0 {
                    anyhow::bail!("cancel_rule requires a positive rule_id");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn place_order_round_trips() {
        let cfg = ActionConfig::PlaceOrder {
            symbol: "RELIANCE".into(),
            transaction_type: TransactionType::Sell,
            quantity: dec!(10),
            order_type: BrokerOrderType::Market,
            product: Product::I,
            price: None,
        };
        cfg.validate().unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ActionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn market_order_rejects_a_price() {
        let cfg = ActionConfig::PlaceOrder {
            symbol: "RELIANCE".into(),
            transaction_type: TransactionType::Sell,
            quantity: dec!(10),
            order_type: BrokerOrderType::Market,
            product: Product::I,
            price: Some(dec!(2400)),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn limit_order_requires_a_price() {
        let cfg = ActionConfig::PlaceOrder {
            symbol: "RELIANCE".into(),
            transaction_type: TransactionType::Buy,
            quantity: dec!(10),
            order_type: BrokerOrderType::Limit,
            product: Product::D,
            price: None,
        };
        assert!(cfg.validate().is_err());
    }
}
