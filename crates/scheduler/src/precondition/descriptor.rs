use std::fmt;

use floorline_core::DeclaredPrecondition;

use crate::machine::StorageQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    InStorage,
    Unknown,
}

/// Slot field an `InStorage` condition is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionTarget {
    ProductId,
    ProductType,
    CarrierId,
    CarrierType,
    /// Matched against all four fields.
    Unknown,
}

impl fmt::Display for ConditionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProductId => "ProductId",
            Self::ProductType => "ProductType",
            Self::CarrierId => "CarrierId",
            Self::CarrierType => "CarrierType",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// A declared precondition after interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionDescriptor {
    pub kind: ConditionKind,
    pub target: ConditionTarget,
    pub raw_value: Option<String>,
    pub condition_id: String,
}

impl PreconditionDescriptor {
    /// Interpret a declared precondition; `position` is 1-based.
    pub fn parse(position: usize, declared: &DeclaredPrecondition) -> Self {
        let kind = match normalized(&declared.condition_type).as_str() {
            "instorage" => ConditionKind::InStorage,
            _ => ConditionKind::Unknown,
        };
        let target = match declared.slot_content_type.as_deref().map(normalized).as_deref() {
            Some("productid") => ConditionTarget::ProductId,
            Some("producttype") => ConditionTarget::ProductType,
            Some("carrierid") => ConditionTarget::CarrierId,
            Some("carriertype") => ConditionTarget::CarrierType,
            _ => ConditionTarget::Unknown,
        };
        let condition_id = declared
            .id_short
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Precondition{position}"));
        let raw_value = declared
            .condition_value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Self {
            kind,
            target,
            raw_value,
            condition_id,
        }
    }

    pub fn parse_all(declared: &[DeclaredPrecondition]) -> Vec<Self> {
        declared
            .iter()
            .enumerate()
            .map(|(i, d)| Self::parse(i + 1, d))
            .collect()
    }

    /// Value as shown in failure messages.
    pub fn display_value(&self) -> &str {
        self.raw_value.as_deref().unwrap_or("")
    }

    /// Storage lookup for this condition, `None` without a value.
    pub fn storage_query(&self) -> Option<StorageQuery> {
        let value = self.raw_value.clone()?;
        let mut query = StorageQuery::default();
        match self.target {
            ConditionTarget::ProductId => query.product_id = Some(value),
            ConditionTarget::ProductType => query.product_type = Some(value),
            ConditionTarget::CarrierId => query.carrier_id = Some(value),
            ConditionTarget::CarrierType => query.carrier_type = Some(value),
            ConditionTarget::Unknown => {
                query.product_id = Some(value.clone());
                query.product_type = Some(value.clone());
                query.carrier_id = Some(value.clone());
                query.carrier_type = Some(value);
            }
        }
        Some(query)
    }
}

fn normalized(raw: &str) -> String {
    raw.trim().to_lowercase()
}
