use serde::{Deserialize, Serialize};

/// Raised when a stored or user-supplied string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid value for {field}: {value}")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + Display + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DocumentType {
    MedicalBill => "medical_bill",
    InsuranceEob => "insurance_eob",
    PharmacyReceipt => "pharmacy_receipt",
    DentalBill => "dental_bill",
    Generic => "generic",
});

impl DocumentType {
    /// Types that carry classifier signals, in tie-break order.
    pub const SCORED: [DocumentType; 4] = [
        DocumentType::MedicalBill,
        DocumentType::InsuranceEob,
        DocumentType::PharmacyReceipt,
        DocumentType::DentalBill,
    ];
}

str_enum!(AmountKind {
    Receipt => "receipt",
    Fsa => "fsa",
    Insurance => "insurance",
});

str_enum!(SourceShape {
    Medical => "medical",
    Dental => "dental",
    Pharmacy => "pharmacy",
    Insurance => "insurance",
    Fsa => "fsa",
});

impl SourceShape {
    /// Which amount lens rows of this shape report.
    pub fn amount_kind(&self) -> AmountKind {
        match self {
            Self::Medical | Self::Dental | Self::Pharmacy => AmountKind::Receipt,
            Self::Insurance => AmountKind::Insurance,
            Self::Fsa => AmountKind::Fsa,
        }
    }

    /// Default row shape for a classified document.
    pub fn for_document(doc_type: DocumentType) -> Self {
        match doc_type {
            DocumentType::DentalBill => Self::Dental,
            DocumentType::PharmacyReceipt => Self::Pharmacy,
            DocumentType::InsuranceEob => Self::Insurance,
            DocumentType::MedicalBill | DocumentType::Generic => Self::Medical,
        }
    }
}

str_enum!(CoverageStatus {
    Reconciled => "reconciled",
    PartiallyReconciled => "partially_reconciled",
    Orphaned => "orphaned",
});

str_enum!(ReviewStatus {
    Pending => "pending",
    Reviewed => "reviewed",
    Disputed => "disputed",
    Resolved => "resolved",
});

str_enum!(IssueKind {
    DuplicateCharge => "duplicate_charge",
    ResponsibilityExceedsAllowed => "responsibility_exceeds_allowed",
    DeniedClaim => "denied_claim",
    FsaShortfall => "fsa_shortfall",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn document_type_round_trip() {
        for (variant, s) in [
            (DocumentType::MedicalBill, "medical_bill"),
            (DocumentType::InsuranceEob, "insurance_eob"),
            (DocumentType::PharmacyReceipt, "pharmacy_receipt"),
            (DocumentType::DentalBill, "dental_bill"),
            (DocumentType::Generic, "generic"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(DocumentType::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn scored_order_is_fixed() {
        assert_eq!(DocumentType::SCORED[0], DocumentType::MedicalBill);
        assert_eq!(DocumentType::SCORED[3], DocumentType::DentalBill);
        assert!(!DocumentType::SCORED.contains(&DocumentType::Generic));
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&CoverageStatus::PartiallyReconciled).unwrap();
        assert_eq!(json, "\"partially_reconciled\"");
        let back: AmountKind = serde_json::from_str("\"fsa\"").unwrap();
        assert_eq!(back, AmountKind::Fsa);
    }

    #[test]
    fn shape_maps_to_amount_lens() {
        assert_eq!(SourceShape::Dental.amount_kind(), AmountKind::Receipt);
        assert_eq!(SourceShape::Insurance.amount_kind(), AmountKind::Insurance);
        assert_eq!(SourceShape::Fsa.amount_kind(), AmountKind::Fsa);
        assert_eq!(
            SourceShape::for_document(DocumentType::Generic),
            SourceShape::Medical
        );
    }

    #[test]
    fn invalid_enum_rejected() {
        let err = ReviewStatus::from_str("archived").unwrap_err();
        assert_eq!(err.field, "ReviewStatus");
        assert!(err.to_string().contains("archived"));
    }
}
