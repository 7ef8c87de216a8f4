//! Status and role enums for CRM entities.
//!
//! Every enum serializes to the exact label the sales portal displays
//! ("Demo Scheduled", "Sales Rep"), and is stored as that same text in the
//! database. `Display` and `FromStr` agree with the serde representation.

use serde::{Deserialize, Serialize};

/// Error returned when a label does not name any variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseLabelError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

macro_rules! labeled_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            /// All variants, in lifecycle order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The stored and displayed label.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseLabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    _ => Err(ParseLabelError {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

labeled_enum! {
    /// Lifecycle status of a prospect.
    ///
    /// Form intake creates prospects as `Active`; the internal create path
    /// starts them at `New`. Any editor may set any value, there is no
    /// enforced transition table.
    ProspectStatus ("prospect status") {
        New => "New",
        Active => "Active",
        Contacted => "Contacted",
        DemoScheduled => "Demo Scheduled",
        /// Terminal.
        Converted => "Converted",
    }
}

labeled_enum! {
    /// Sales pipeline status shown in the rep portal.
    LeadStatus ("lead status") {
        New => "New",
        Contacted => "Contacted",
        DemoScheduled => "Demo Scheduled",
        Converted => "Converted",
    }
}

labeled_enum! {
    /// Outreach priority.
    Priority ("priority") {
        Low => "Low",
        Medium => "Medium",
        High => "High",
    }
}

labeled_enum! {
    /// Appointment status.
    AppointmentStatus ("appointment status") {
        Scheduled => "Scheduled",
        Completed => "Completed",
        Cancelled => "Cancelled",
    }
}

labeled_enum! {
    /// Role claim carried by every authenticated identity.
    Role ("role") {
        /// Full access, including user management and analytics.
        Admin => "Admin",
        /// Works the prospects assigned to them.
        SalesRep => "Sales Rep",
        /// Sales lead with edit rights over every prospect.
        CountryHead => "Country Head",
        /// Converted customer; may only touch their own credit ledger.
        Customer => "Customer",
    }
}

impl Role {
    /// Whether this role is backed by a sales rep record that can receive
    /// prospect assignments.
    #[must_use]
    pub const fn is_sales_staff(self) -> bool {
        matches!(self, Self::SalesRep | Self::CountryHead)
    }
}

impl From<ProspectStatus> for Option<LeadStatus> {
    fn from(status: ProspectStatus) -> Self {
        match status {
            ProspectStatus::New => Some(LeadStatus::New),
            ProspectStatus::Contacted => Some(LeadStatus::Contacted),
            ProspectStatus::DemoScheduled => Some(LeadStatus::DemoScheduled),
            ProspectStatus::Converted => Some(LeadStatus::Converted),
            ProspectStatus::Active => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_labels_roundtrip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), *role);
        }
    }

    #[test]
    fn test_role_serde_uses_label() {
        assert_eq!(
            serde_json::to_string(&Role::SalesRep).unwrap(),
            "\"Sales Rep\""
        );
        let role: Role = serde_json::from_str("\"Country Head\"").unwrap();
        assert_eq!(role, Role::CountryHead);
    }

    #[test]
    fn test_parse_rejects_unknown_label() {
        let err = "sales_rep".parse::<Role>().unwrap_err();
        assert_eq!(err.kind, "role");
        assert_eq!(err.to_string(), "invalid role: sales_rep");
    }

    #[test]
    fn test_demo_scheduled_label() {
        assert_eq!(ProspectStatus::DemoScheduled.to_string(), "Demo Scheduled");
        assert_eq!(
            "Demo Scheduled".parse::<LeadStatus>().unwrap(),
            LeadStatus::DemoScheduled
        );
    }

    #[test]
    fn test_sales_staff() {
        assert!(Role::SalesRep.is_sales_staff());
        assert!(Role::CountryHead.is_sales_staff());
        assert!(!Role::Admin.is_sales_staff());
        assert!(!Role::Customer.is_sales_staff());
    }

    #[test]
    fn test_status_mirrors_into_lead_status() {
        let mirrored: Option<LeadStatus> = ProspectStatus::Converted.into();
        assert_eq!(mirrored, Some(LeadStatus::Converted));
        let active: Option<LeadStatus> = ProspectStatus::Active.into();
        assert_eq!(active, None);
    }
}
