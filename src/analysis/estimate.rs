//! Material estimating: complexity class, gross squares, bill of materials.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::domain::estimate::{
    ComplexityClass, MaterialCategory, MaterialEstimate, MaterialLineItem, ShingleType,
    WasteScenario,
};
use crate::domain::measurements::{AreaFigures, EdgeTotals};

/// Hip + valley share of total edge length above which a roof is cut up.
pub const HIP_VALLEY_FRACTION_THRESHOLD: f64 = 0.25;
pub const FACET_COUNT_THRESHOLD: usize = 6;
pub const OBSTRUCTION_COUNT_THRESHOLD: usize = 3;

const WASTE_SCENARIOS: [(u32, &str); 4] = [
    (5, "Minimal waste (simple gable)"),
    (10, "Standard waste (moderate complexity)"),
    (15, "Above average (hips/valleys)"),
    (20, "High waste (complex/cut-up roof)"),
];

// Coverage per order unit
const UNDERLAYMENT_SQFT_PER_ROLL: f64 = 1000.0;
const ICE_SHIELD_WIDTH_FT: f64 = 3.0;
const ICE_SHIELD_SQFT_PER_ROLL: f64 = 75.0;
const STARTER_FT_PER_BUNDLE: f64 = 105.0;
const RIDGE_CAP_FT_PER_BUNDLE: f64 = 33.0;
const DRIP_EDGE_FT_PER_PIECE: f64 = 10.0;
const VALLEY_FLASHING_FT_PER_PIECE: f64 = 10.0;
const NAIL_LBS_PER_SQUARE: f64 = 1.5;
const NAIL_LBS_PER_BOX: f64 = 30.0;
const RIDGE_VENT_FT_PER_PIECE: f64 = 4.0;

/// Alberta pricing, CAD.
fn price(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Inputs beyond the derived geometry.
#[derive(Debug, Clone, Copy)]
pub struct EstimateInputs {
    pub facet_count: usize,
    pub obstruction_count: usize,
    pub shingle_type: Option<ShingleType>,
}

/// Classify a roof. Each condition only ever raises the class.
pub fn classify_complexity(
    edges: &EdgeTotals,
    facet_count: usize,
    obstruction_count: usize,
) -> ComplexityClass {
    let total = edges.total_ft();
    let cut_up = total > 0.0 && edges.hip_and_valley_ft() > HIP_VALLEY_FRACTION_THRESHOLD * total;
    let crowded = facet_count > FACET_COUNT_THRESHOLD || obstruction_count > OBSTRUCTION_COUNT_THRESHOLD;

    let mut class = ComplexityClass::Simple;
    if cut_up {
        class = class.max(ComplexityClass::Moderate);
    }
    if crowded {
        class = class.max(ComplexityClass::Complex);
    }
    if cut_up && crowded {
        class = class.max(ComplexityClass::VeryComplex);
    }
    class
}

/// Build the material estimate for a derived roof.
pub fn estimate_materials(
    areas: &AreaFigures,
    edges: &EdgeTotals,
    inputs: EstimateInputs,
) -> MaterialEstimate {
    let shingle_type = inputs.shingle_type.unwrap_or_default();
    let complexity_class = classify_complexity(edges, inputs.facet_count, inputs.obstruction_count);
    let waste_pct = complexity_class.waste_pct();

    let net_area_sqft = areas.true_area_sqft;
    let gross_area_sqft = net_area_sqft * (1.0 + f64::from(waste_pct) / 100.0);
    let gross_squares = ceil_count(gross_area_sqft / 100.0);
    let bundle_count = gross_squares * shingle_type.bundles_per_square();

    let line_items = bill_of_materials(
        shingle_type,
        net_area_sqft,
        gross_area_sqft,
        gross_squares,
        bundle_count,
        edges,
    );
    let total_material_cost: Decimal = line_items.iter().map(|item| item.line_total).sum();

    tracing::debug!(
        complexity = %complexity_class,
        waste_pct,
        gross_squares,
        bundle_count,
        total_material_cost = %total_material_cost,
        "Computed material estimate"
    );

    MaterialEstimate {
        shingle_type,
        complexity_class,
        waste_pct,
        net_area_sqft,
        gross_area_sqft,
        gross_squares,
        bundle_count,
        line_items,
        waste_table: waste_table(net_area_sqft, shingle_type),
        total_material_cost,
    }
}

/// Order quantities at each standard overage.
pub fn waste_table(net_area_sqft: f64, shingle_type: ShingleType) -> Vec<WasteScenario> {
    WASTE_SCENARIOS
        .iter()
        .map(|(pct, description)| {
            let gross_sqft = net_area_sqft * (1.0 + f64::from(*pct) / 100.0);
            let squares = gross_sqft / 100.0;
            WasteScenario {
                waste_pct: *pct,
                description: description.to_string(),
                gross_sqft: gross_sqft.round(),
                squares: (squares * 10.0).round() / 10.0,
                bundles: ceil_count(squares * f64::from(shingle_type.bundles_per_square())),
            }
        })
        .collect()
}

fn bill_of_materials(
    shingle_type: ShingleType,
    net_area_sqft: f64,
    gross_area_sqft: f64,
    gross_squares: u32,
    bundle_count: u32,
    edges: &EdgeTotals,
) -> Vec<MaterialLineItem> {
    let mut items = vec![line_item(
        MaterialCategory::Shingles,
        shingle_type.description(),
        net_area_sqft / 100.0,
        "squares",
        bundle_count,
        "bundles",
        shingle_type.bundle_price(),
    )];

    items.push(line_item(
        MaterialCategory::Underlayment,
        "Synthetic Underlayment",
        net_area_sqft,
        "sqft",
        ceil_count(gross_area_sqft / UNDERLAYMENT_SQFT_PER_ROLL),
        "rolls",
        price(8500),
    ));

    let ice_shield_sqft = (edges.eave_ft + edges.valley_ft) * ICE_SHIELD_WIDTH_FT;
    items.push(line_item(
        MaterialCategory::IceShield,
        "Ice & Water Shield Membrane",
        ice_shield_sqft,
        "sqft",
        ceil_count(ice_shield_sqft / ICE_SHIELD_SQFT_PER_ROLL),
        "rolls",
        price(12500),
    ));

    let perimeter_ft = edges.eave_ft + edges.rake_ft;
    items.push(line_item(
        MaterialCategory::StarterStrip,
        "Starter Strip Shingles",
        perimeter_ft,
        "linear_ft",
        ceil_count(perimeter_ft / STARTER_FT_PER_BUNDLE),
        "bundles",
        price(3500),
    ));

    let cap_ft = edges.ridge_ft + edges.hip_ft;
    items.push(line_item(
        MaterialCategory::RidgeCap,
        "Ridge/Hip Cap Shingles",
        cap_ft,
        "linear_ft",
        ceil_count(cap_ft / RIDGE_CAP_FT_PER_BUNDLE),
        "bundles",
        price(5500),
    ));

    items.push(line_item(
        MaterialCategory::DripEdge,
        "Aluminum Drip Edge (10 ft sections)",
        perimeter_ft,
        "linear_ft",
        ceil_count(perimeter_ft / DRIP_EDGE_FT_PER_PIECE),
        "pieces",
        price(850),
    ));

    if edges.valley_ft > 0.0 {
        items.push(line_item(
            MaterialCategory::ValleyMetal,
            "Pre-bent Valley Flashing (W-valley, 10 ft)",
            edges.valley_ft,
            "linear_ft",
            ceil_count(edges.valley_ft / VALLEY_FLASHING_FT_PER_PIECE),
            "pieces",
            price(2200),
        ));
    }

    let nail_lbs = f64::from(gross_squares) * NAIL_LBS_PER_SQUARE;
    items.push(line_item(
        MaterialCategory::Nails,
        "1-1/4\" Galvanized Roofing Nails (30 lb box)",
        nail_lbs,
        "lbs",
        ceil_count(nail_lbs.ceil() / NAIL_LBS_PER_BOX),
        "boxes",
        price(6500),
    ));

    if edges.ridge_ft > 0.0 {
        items.push(line_item(
            MaterialCategory::Ventilation,
            "Ridge Vent (4 ft sections)",
            edges.ridge_ft,
            "linear_ft",
            ceil_count(edges.ridge_ft / RIDGE_VENT_FT_PER_PIECE),
            "pieces",
            price(1800),
        ));
    }

    items
}

fn line_item(
    category: MaterialCategory,
    description: &str,
    net_quantity: f64,
    unit: &str,
    order_quantity: u32,
    order_unit: &str,
    unit_price: Decimal,
) -> MaterialLineItem {
    MaterialLineItem {
        category,
        description: description.to_string(),
        net_quantity: (net_quantity * 10.0).round() / 10.0,
        unit: unit.to_string(),
        order_quantity,
        order_unit: order_unit.to_string(),
        unit_price,
        line_total: unit_price * Decimal::from(order_quantity),
    }
}

/// Round a non-negative quantity up to a whole order count.
///
/// Trims float noise first so that e.g. 12.000000000000002 orders 12, not 13.
fn ceil_count(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let trimmed = Decimal::from_f64(value)
        .map(|d| d.round_dp(9))
        .and_then(|d| rust_decimal::prelude::ToPrimitive::to_f64(&d))
        .unwrap_or(value);
    trimmed.ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn areas(true_area_sqft: f64) -> AreaFigures {
        AreaFigures {
            footprint_sqft: true_area_sqft,
            footprint_sqm: 0.0,
            true_area_sqft,
            true_area_sqm: 0.0,
            area_multiplier: 1.0,
            pitch_degrees: 0.0,
            pitch_ratio: "0:12".to_string(),
            weighted_pitch_degrees: 0.0,
            facets: vec![],
        }
    }

    fn gable_edges() -> EdgeTotals {
        EdgeTotals {
            ridge_ft: 40.0,
            hip_ft: 0.0,
            valley_ft: 0.0,
            eave_ft: 80.0,
            rake_ft: 60.0,
        }
    }

    fn inputs(facet_count: usize, obstruction_count: usize) -> EstimateInputs {
        EstimateInputs {
            facet_count,
            obstruction_count,
            shingle_type: None,
        }
    }

    #[test]
    fn test_complexity_classes() {
        let gable = gable_edges();
        let hipped = EdgeTotals {
            hip_ft: 60.0,
            valley_ft: 20.0,
            ..gable
        };

        assert_eq!(classify_complexity(&gable, 2, 0), ComplexityClass::Simple);
        assert_eq!(classify_complexity(&hipped, 4, 1), ComplexityClass::Moderate);
        assert_eq!(classify_complexity(&gable, 7, 0), ComplexityClass::Complex);
        assert_eq!(classify_complexity(&gable, 2, 4), ComplexityClass::Complex);
        assert_eq!(classify_complexity(&hipped, 8, 0), ComplexityClass::VeryComplex);
        assert_eq!(classify_complexity(&EdgeTotals::default(), 0, 0), ComplexityClass::Simple);
    }

    #[test]
    fn test_complexity_escalation_is_monotonic() {
        let base = gable_edges();
        for facets in 0..10 {
            for obstructions in 0..6 {
                for extra in 0..8 {
                    let edges = EdgeTotals {
                        hip_ft: base.hip_ft + extra as f64 * 10.0,
                        ..base
                    };
                    let class = classify_complexity(&edges, facets, obstructions);
                    let more_hip = EdgeTotals {
                        hip_ft: edges.hip_ft + 10.0,
                        ..edges
                    };

                    assert!(classify_complexity(&edges, facets + 1, obstructions) >= class);
                    assert!(classify_complexity(&edges, facets, obstructions + 1) >= class);
                    assert!(classify_complexity(&more_hip, facets, obstructions) >= class);
                }
            }
        }
    }

    #[test]
    fn test_gross_squares_include_waste() {
        let estimate = estimate_materials(&areas(2000.0), &gable_edges(), inputs(2, 0));

        assert_eq!(estimate.complexity_class, ComplexityClass::Simple);
        assert_eq!(estimate.waste_pct, 10);
        assert_eq!(estimate.gross_squares, 22);
        assert_eq!(estimate.bundle_count, 66);
        assert_eq!(estimate.shingle_type, ShingleType::Architectural);
    }

    #[test]
    fn test_gross_squares_round_up() {
        let estimate = estimate_materials(&areas(2050.0), &gable_edges(), inputs(2, 0));
        // 2050 * 1.10 = 2255 sqft
        assert_eq!(estimate.gross_squares, 23);

        let very_complex = estimate_materials(
            &areas(2000.0),
            &EdgeTotals {
                hip_ft: 100.0,
                ..gable_edges()
            },
            inputs(8, 0),
        );
        assert_eq!(very_complex.waste_pct, 25);
        assert_eq!(very_complex.gross_squares, 25);
    }

    #[test]
    fn test_bill_of_materials_totals() {
        let estimate = estimate_materials(&areas(2000.0), &gable_edges(), inputs(2, 0));

        let find = |category| {
            estimate
                .line_items
                .iter()
                .find(|item| item.category == category)
                .cloned()
        };

        let shingles = find(MaterialCategory::Shingles).unwrap();
        assert_eq!(shingles.order_quantity, 66);
        assert_eq!(shingles.line_total, Decimal::new(277200, 2));

        // (80 eave + 0 valley) * 3 ft / 75 sqft per roll
        assert_eq!(find(MaterialCategory::IceShield).unwrap().order_quantity, 4);
        // 140 ft perimeter / 105 ft per bundle
        assert_eq!(find(MaterialCategory::StarterStrip).unwrap().order_quantity, 2);
        assert_eq!(find(MaterialCategory::DripEdge).unwrap().order_quantity, 14);
        assert_eq!(find(MaterialCategory::Ventilation).unwrap().order_quantity, 10);
        assert!(find(MaterialCategory::ValleyMetal).is_none());

        let sum: Decimal = estimate.line_items.iter().map(|i| i.line_total).sum();
        assert_eq!(estimate.total_material_cost, sum);
        assert!(estimate.total_material_cost > Decimal::ZERO);
    }

    #[test]
    fn test_three_tab_pricing() {
        let estimate = estimate_materials(
            &areas(1000.0),
            &gable_edges(),
            EstimateInputs {
                facet_count: 2,
                obstruction_count: 0,
                shingle_type: Some(ShingleType::ThreeTab),
            },
        );
        let shingles = &estimate.line_items[0];
        assert_eq!(shingles.unit_price, Decimal::new(3200, 2));
        assert_eq!(shingles.order_quantity, 33);
    }

    #[test]
    fn test_waste_table() {
        let table = waste_table(2000.0, ShingleType::Architectural);
        assert_eq!(table.len(), 4);
        assert_eq!(table[0].waste_pct, 5);
        assert_eq!(table[0].gross_sqft, 2100.0);
        assert_eq!(table[0].squares, 21.0);
        assert_eq!(table[0].bundles, 63);
        assert_eq!(table[3].bundles, 72);
    }

    #[test]
    fn test_ceil_count_ignores_float_noise() {
        assert_eq!(ceil_count(22.000000000000004), 22);
        assert_eq!(ceil_count(22.01), 23);
        assert_eq!(ceil_count(0.0), 0);
        assert_eq!(ceil_count(f64::NAN), 0);
    }
}
