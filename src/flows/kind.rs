use std::fmt;

use crate::properties::PropertyValue;

/// Business domain of a flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Purchase,
    SubscriptionPurchase,
    Registration,
}

impl FlowKind {
    /// Name of the moment that times the flow.
    pub fn moment_name(self) -> &'static str {
        match self {
            FlowKind::Purchase => "_purchase",
            FlowKind::SubscriptionPurchase => "_subscription_purchase",
            FlowKind::Registration => "_registration",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FlowKind::Purchase => "purchase",
            FlowKind::SubscriptionPurchase => "subscription purchase",
            FlowKind::Registration => "registration",
        }
    }

    pub fn completed_event_name(self) -> String {
        format!("{} completed", self.label())
    }

    pub fn failed_event_name(self) -> String {
        format!("{} failed", self.label())
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Purchase details known when the user commits to buy. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PurchaseDetails {
    pub order_id: Option<String>,
    pub num_items: Option<u32>,
    pub amount: Option<f64>,
    pub payment_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriptionPurchaseDetails {
    pub order_id: Option<String>,
    /// Recurrence of the subscription, e.g. "monthly" or "annual".
    pub subscription_type: Option<String>,
    pub amount: Option<f64>,
    pub payment_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistrationDetails {
    pub username: Option<String>,
    pub email: Option<String>,
    pub internal_user_id: Option<String>,
}

/// Per-domain description of a flow: which kind it is and which implicit properties it
/// contributes.
#[derive(Clone, Debug, PartialEq)]
pub enum FlowDetails {
    Purchase(PurchaseDetails),
    SubscriptionPurchase(SubscriptionPurchaseDetails),
    Registration(RegistrationDetails),
}

impl FlowDetails {
    pub fn kind(&self) -> FlowKind {
        match self {
            FlowDetails::Purchase(_) => FlowKind::Purchase,
            FlowDetails::SubscriptionPurchase(_) => FlowKind::SubscriptionPurchase,
            FlowDetails::Registration(_) => FlowKind::Registration,
        }
    }

    /// Implicit properties in their fixed order; absent values are skipped.
    pub fn implicit_properties(&self) -> Vec<(&'static str, PropertyValue)> {
        let mut properties = Vec::new();
        let mut push = |key: &'static str, value: Option<PropertyValue>| {
            if let Some(value) = value {
                properties.push((key, value));
            }
        };
        match self {
            FlowDetails::Purchase(details) => {
                push("order_id", details.order_id.as_ref().map(Into::into));
                push("num_items", details.num_items.map(Into::into));
                push("amount", details.amount.map(Into::into));
                push("payment_type", details.payment_type.as_ref().map(Into::into));
            }
            FlowDetails::SubscriptionPurchase(details) => {
                push("order_id", details.order_id.as_ref().map(Into::into));
                push(
                    "subscription_type",
                    details.subscription_type.as_ref().map(Into::into),
                );
                push("amount", details.amount.map(Into::into));
                push("payment_type", details.payment_type.as_ref().map(Into::into));
            }
            FlowDetails::Registration(details) => {
                push("username", details.username.as_ref().map(Into::into));
                push("email", details.email.as_ref().map(Into::into));
                push(
                    "internal_user_id",
                    details.internal_user_id.as_ref().map(Into::into),
                );
            }
        }
        properties
    }
}

impl From<PurchaseDetails> for FlowDetails {
    fn from(details: PurchaseDetails) -> Self {
        FlowDetails::Purchase(details)
    }
}

impl From<SubscriptionPurchaseDetails> for FlowDetails {
    fn from(details: SubscriptionPurchaseDetails) -> Self {
        FlowDetails::SubscriptionPurchase(details)
    }
}

impl From<RegistrationDetails> for FlowDetails {
    fn from(details: RegistrationDetails) -> Self {
        FlowDetails::Registration(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_properties_keep_declared_order() {
        let details = FlowDetails::from(PurchaseDetails {
            order_id: Some("A-1".into()),
            num_items: Some(3),
            amount: Some(19.5),
            payment_type: None,
        });
        let keys: Vec<&str> = details
            .implicit_properties()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["order_id", "num_items", "amount"]);
        assert_eq!(details.kind(), FlowKind::Purchase);
    }

    #[test]
    fn registration_without_details_has_no_implicit_properties() {
        let details = FlowDetails::from(RegistrationDetails::default());
        assert!(details.implicit_properties().is_empty());
        assert_eq!(details.kind().moment_name(), "_registration");
    }

    #[test]
    fn event_names_follow_label() {
        assert_eq!(
            FlowKind::SubscriptionPurchase.completed_event_name(),
            "subscription purchase completed"
        );
        assert_eq!(FlowKind::Registration.failed_event_name(), "registration failed");
    }
}
