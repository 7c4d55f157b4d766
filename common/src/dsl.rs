//! Parsed value-movement request. The textual DSL is parsed by the front
//! end; this module carries the structures it produces and the validation
//! that turns them into per-alias deltas.

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{config::DEFAULT_BALANCE_KEY, error::DslError, ledger::Metadata};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    pub asset: String,
    pub value: Decimal,
}

// Relative leg amount, resolved against the declared send value
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub percentage: Decimal,
}

// One leg of the movement. The account target is an alias, a balance id,
// or an alias routed to a non-default balance via balance_key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FromTo {
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<Share>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_of_accounts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_key: Option<String>,
}

impl FromTo {
    // Key the leg is accounted under: bare target, or "{target}#{key}"
    // when routed to a non-default balance
    pub fn target_key(&self) -> String {
        match self.balance_key.as_deref() {
            Some(key) if !key.is_empty() && key != DEFAULT_BALANCE_KEY => {
                format!("{}#{}", self.account, key)
            }
            _ => self.account.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub from: Vec<FromTo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Distribute {
    pub to: Vec<FromTo>,
}

// Root of a parsed movement request
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Send {
    pub asset: String,
    pub value: Decimal,
    pub source: Source,
    pub distribute: Distribute,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_of_accounts_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

// Validated deltas the balance update and the operation builder consume.
// Maps are keyed by the leg target key; insertion order is preserved so
// operations come out in request order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Responses {
    pub total: Decimal,
    pub asset: String,
    pub from: IndexMap<String, Amount>,
    pub to: IndexMap<String, Amount>,
    pub sources: Vec<String>,
    pub destinations: Vec<String>,
    pub aliases: Vec<String>,
}

// Resolve legs to absolute amounts and check the double-entry identity:
// per asset, debits and credits must sum to the same value
pub fn validate_send(send: &Send) -> Result<Responses, DslError> {
    if send.source.from.is_empty() || send.distribute.to.is_empty() {
        return Err(DslError::MissingLeg);
    }

    let mut from = IndexMap::new();
    let mut sources = Vec::new();
    let mut debits: IndexMap<String, Decimal> = IndexMap::new();
    for leg in &send.source.from {
        let amount = resolve_leg_amount(send, leg)?;
        *debits.entry(amount.asset.clone()).or_default() += amount.value;
        accumulate(&mut from, &mut sources, leg.target_key(), amount);
    }

    let mut to = IndexMap::new();
    let mut destinations = Vec::new();
    let mut credits: IndexMap<String, Decimal> = IndexMap::new();
    for leg in &send.distribute.to {
        let amount = resolve_leg_amount(send, leg)?;
        *credits.entry(amount.asset.clone()).or_default() += amount.value;
        accumulate(&mut to, &mut destinations, leg.target_key(), amount);
    }

    for (asset, debit_sum) in &debits {
        let credit_sum = credits.get(asset).copied().unwrap_or(Decimal::ZERO);
        if *debit_sum != credit_sum {
            return Err(DslError::Unbalanced {
                asset: asset.clone(),
                debits: *debit_sum,
                credits: credit_sum,
            });
        }
    }
    for asset in credits.keys() {
        if !debits.contains_key(asset) {
            return Err(DslError::Unbalanced {
                asset: asset.clone(),
                debits: Decimal::ZERO,
                credits: credits[asset],
            });
        }
    }

    let total = debits.get(&send.asset).copied().unwrap_or(Decimal::ZERO);
    if !send.value.is_zero() && total != send.value {
        return Err(DslError::TotalMismatch { total, value: send.value });
    }

    let mut aliases = sources.clone();
    for destination in &destinations {
        if !aliases.contains(destination) {
            aliases.push(destination.clone());
        }
    }

    Ok(Responses {
        total,
        asset: send.asset.clone(),
        from,
        to,
        sources,
        destinations,
        aliases,
    })
}

fn resolve_leg_amount(send: &Send, leg: &FromTo) -> Result<Amount, DslError> {
    match (&leg.amount, &leg.share) {
        (Some(_), Some(_)) => Err(DslError::AmbiguousLegAmount { account: leg.account.clone() }),
        (Some(amount), None) => Ok(amount.clone()),
        (None, Some(share)) => Ok(Amount {
            asset: send.asset.clone(),
            value: send.value * share.percentage / Decimal::ONE_HUNDRED,
        }),
        (None, None) => Err(DslError::MissingLegAmount { account: leg.account.clone() }),
    }
}

fn accumulate(
    map: &mut IndexMap<String, Amount>,
    order: &mut Vec<String>,
    key: String,
    amount: Amount,
) {
    match map.get_mut(&key) {
        // Two legs on the same target collapse into one delta
        Some(existing) => existing.value += amount.value,
        None => {
            order.push(key.clone());
            map.insert(key, amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn leg(account: &str, value: Decimal) -> FromTo {
        FromTo {
            account: account.to_string(),
            amount: Some(Amount { asset: "USD".to_string(), value }),
            share: None,
            description: None,
            chart_of_accounts: None,
            metadata: None,
            balance_key: None,
        }
    }

    fn send(from: Vec<FromTo>, to: Vec<FromTo>) -> Send {
        Send {
            asset: "USD".to_string(),
            value: dec!(100),
            source: Source { from },
            distribute: Distribute { to },
            description: Some("settlement".to_string()),
            chart_of_accounts_group_name: None,
            metadata: None,
        }
    }

    #[test]
    fn balanced_send_produces_deltas() {
        let send = send(
            vec![leg("@cash", dec!(100))],
            vec![leg("@merchant", dec!(70)), leg("@fees", dec!(30))],
        );
        let validated = validate_send(&send).unwrap();
        assert_eq!(validated.total, dec!(100));
        assert_eq!(validated.from["@cash"].value, dec!(100));
        assert_eq!(validated.to["@merchant"].value, dec!(70));
        assert_eq!(validated.aliases, vec!["@cash", "@merchant", "@fees"]);
    }

    #[test]
    fn unbalanced_send_is_refused() {
        let send = send(vec![leg("@cash", dec!(100))], vec![leg("@merchant", dec!(90))]);
        assert!(matches!(validate_send(&send), Err(DslError::Unbalanced { .. })));
    }

    #[test]
    fn shares_resolve_against_the_send_value() {
        let mut to_a = leg("@merchant", Decimal::ZERO);
        to_a.amount = None;
        to_a.share = Some(Share { percentage: dec!(60) });
        let mut to_b = leg("@fees", Decimal::ZERO);
        to_b.amount = None;
        to_b.share = Some(Share { percentage: dec!(40) });

        let send = send(vec![leg("@cash", dec!(100))], vec![to_a, to_b]);
        let validated = validate_send(&send).unwrap();
        assert_eq!(validated.to["@merchant"].value, dec!(60));
        assert_eq!(validated.to["@fees"].value, dec!(40));
    }

    #[test]
    fn amount_and_share_together_are_ambiguous() {
        let mut bad = leg("@merchant", dec!(100));
        bad.share = Some(Share { percentage: dec!(100) });
        let send = send(vec![leg("@cash", dec!(100))], vec![bad]);
        assert_eq!(
            validate_send(&send),
            Err(DslError::AmbiguousLegAmount { account: "@merchant".to_string() })
        );
    }

    #[test]
    fn balance_key_routes_to_a_composite_target() {
        let mut escrow = leg("@merchant", dec!(100));
        escrow.balance_key = Some("escrow".to_string());
        let send = send(vec![leg("@cash", dec!(100))], vec![escrow]);
        let validated = validate_send(&send).unwrap();
        assert!(validated.to.contains_key("@merchant#escrow"));
    }

    #[test]
    fn duplicate_targets_accumulate() {
        let send = send(
            vec![leg("@cash", dec!(60)), leg("@cash", dec!(40))],
            vec![leg("@merchant", dec!(100))],
        );
        let validated = validate_send(&send).unwrap();
        assert_eq!(validated.from["@cash"].value, dec!(100));
        assert_eq!(validated.sources, vec!["@cash"]);
    }
}
