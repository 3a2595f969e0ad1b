use serde::{Deserialize, Serialize};

use crate::entity::{GovernmentClassifier, OrganizationName};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub buyer_name: Option<String>,
    pub winner_name: Option<String>,
    pub swapped: bool,
}

/// Which branch of the resolver fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleOutcome {
    Unchanged,
    /// A public body sat in the winner slot with no buyer at all.
    PromotedToBuyer,
    Swapped,
    /// Both names are public bodies; the winner is dropped.
    WinnerDiscarded,
}

impl RoleOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::PromotedToBuyer => "promoted_to_buyer",
            Self::Swapped => "swapped",
            Self::WinnerDiscarded => "winner_discarded",
        }
    }
}

impl std::fmt::Display for RoleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub assignment: RoleAssignment,
    pub outcome: RoleOutcome,
}

/// Validates a buyer/winner pair against the government classifier.
#[derive(Debug, Clone, Default)]
pub struct RoleResolver {
    classifier: GovernmentClassifier,
}

impl RoleResolver {
    #[must_use]
    pub fn new(classifier: GovernmentClassifier) -> Self {
        Self { classifier }
    }

    #[must_use]
    pub fn classifier(&self) -> &GovernmentClassifier {
        &self.classifier
    }

    #[must_use]
    pub fn resolve(&self, buyer: Option<&str>, winner: Option<&str>) -> Resolution {
        let buyer = OrganizationName::parse(buyer);
        let winner = OrganizationName::parse(winner);

        let buyer_is_gov = buyer
            .as_ref()
            .is_some_and(|b| b.is_government(&self.classifier));
        let winner_is_gov = winner
            .as_ref()
            .is_some_and(|w| w.is_government(&self.classifier));

        let (buyer_name, winner_name, outcome) = match (buyer, winner) {
            (None, Some(winner)) if winner_is_gov => {
                tracing::info!("Promoting public body '{}' from winner to buyer", winner);
                (Some(winner), None, RoleOutcome::PromotedToBuyer)
            }
            (Some(buyer), Some(winner)) if winner_is_gov && !buyer_is_gov => {
                tracing::info!(
                    "Swapping roles: winner '{}' is a public body, buyer '{}' is not",
                    winner,
                    buyer
                );
                (Some(winner), Some(buyer), RoleOutcome::Swapped)
            }
            (Some(buyer), Some(winner)) if winner_is_gov => {
                tracing::warn!(
                    "Both names look public: buyer='{}', winner='{}'; dropping winner",
                    buyer,
                    winner
                );
                (Some(buyer), None, RoleOutcome::WinnerDiscarded)
            }
            (buyer, winner) => (buyer, winner, RoleOutcome::Unchanged),
        };

        Resolution {
            assignment: RoleAssignment {
                buyer_name: buyer_name.map(OrganizationName::into_inner),
                winner_name: winner_name.map(OrganizationName::into_inner),
                swapped: matches!(
                    outcome,
                    RoleOutcome::PromotedToBuyer | RoleOutcome::Swapped
                ),
            },
            outcome,
        }
    }
}
