//! Material estimate types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShingleType {
    #[default]
    Architectural,
    ThreeTab,
}

impl ShingleType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "architectural" | "laminate" => Some(Self::Architectural),
            "3tab" | "3_tab" | "three_tab" => Some(Self::ThreeTab),
            _ => None,
        }
    }

    pub fn bundles_per_square(&self) -> u32 {
        match self {
            Self::Architectural | Self::ThreeTab => 3,
        }
    }

    /// CAD per bundle.
    pub fn bundle_price(&self) -> Decimal {
        match self {
            Self::Architectural => Decimal::new(4200, 2),
            Self::ThreeTab => Decimal::new(3200, 2),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Architectural => "Architectural (Laminate) Shingles",
            Self::ThreeTab => "3-Tab Standard Shingles",
        }
    }
}

/// Ordered from least to most complex; `Ord` follows escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityClass {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl ComplexityClass {
    /// Minimum waste allowance, in percent.
    pub fn waste_pct(&self) -> u32 {
        match self {
            Self::Simple => 10,
            Self::Moderate => 15,
            Self::Complex => 20,
            Self::VeryComplex => 25,
        }
    }
}

impl std::fmt::Display for ComplexityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::VeryComplex => "very_complex",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialCategory {
    Shingles,
    Underlayment,
    IceShield,
    StarterStrip,
    RidgeCap,
    DripEdge,
    ValleyMetal,
    Nails,
    Ventilation,
}

/// One line of the bill of materials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialLineItem {
    pub category: MaterialCategory,
    pub description: String,
    pub net_quantity: f64,
    pub unit: String,
    pub order_quantity: u32,
    pub order_unit: String,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Order quantities at a given overage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteScenario {
    pub waste_pct: u32,
    pub description: String,
    pub gross_sqft: f64,
    pub squares: f64,
    pub bundles: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialEstimate {
    pub shingle_type: ShingleType,
    pub complexity_class: ComplexityClass,
    pub waste_pct: u32,
    pub net_area_sqft: f64,
    pub gross_area_sqft: f64,
    /// 100 sqft units including waste, rounded up.
    pub gross_squares: u32,
    pub bundle_count: u32,
    pub line_items: Vec<MaterialLineItem>,
    pub waste_table: Vec<WasteScenario>,
    /// CAD.
    pub total_material_cost: Decimal,
}
