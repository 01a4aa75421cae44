//! Extraction output -> typed stops
//!
//! Entries with an unknown stop type or an empty address are skipped. Missing
//! loads are filled from the shipment totals, split over the stops of the
//! same side (pickups carry the full load once, deliveries drop it once).

use uuid::Uuid;

use crate::defaults::LBS_PER_PALLET_ESTIMATE;
use crate::error::Warnings;
use crate::types::{normalize_country, Equipment, ExtractionOutput, Shipment, Stop, StopType};

#[derive(Debug, Clone, Default)]
pub struct NormalizedStops {
    pub stops: Vec<Stop>,
    pub liftgate: bool,
    pub inside_delivery: bool,
    pub reefer: bool,
    pub warnings: Warnings,
}

fn fill_side(stops: &mut [Stop], side: StopType, total_weight: Option<f64>, total_pallets: Option<u32>, given: &[(bool, bool)]) {
    let count = stops.iter().filter(|s| s.stop_type == side).count();
    if count == 0 {
        return;
    }

    for (stop, (has_weight, has_pallets)) in stops.iter_mut().zip(given) {
        if stop.stop_type != side {
            continue;
        }
        if !has_weight {
            if let Some(total) = total_weight.filter(|t| *t > 0.0) {
                stop.weight_lbs = (total / count as f64 * 100.0).round() / 100.0;
            }
        }
        if !has_pallets {
            stop.pallets = match total_pallets.filter(|t| *t > 0) {
                Some(total) => (total as f64 / count as f64).ceil().max(1.0) as u32,
                None if stop.weight_lbs > 0.0 => (stop.weight_lbs / LBS_PER_PALLET_ESTIMATE).ceil().max(1.0) as u32,
                None => 0,
            };
        }
    }
}

/// Turn extraction output into ordered stops with sequences 1..n.
pub fn normalize_stops(output: &ExtractionOutput, shipment_id: Option<Uuid>) -> NormalizedStops {
    let mut result = NormalizedStops::default();
    result.warnings.extend(output.warnings.iter().cloned());

    let mut given: Vec<(bool, bool)> = Vec::new();
    for (idx, raw) in output.stops.iter().enumerate() {
        let Some(stop_type) = StopType::parse(&raw.stop_type) else {
            result
                .warnings
                .push(format!("Skipped extracted stop {}: unknown stop type '{}'", idx + 1, raw.stop_type));
            continue;
        };
        let address = raw.address.trim();
        if address.is_empty() {
            result
                .warnings
                .push(format!("Skipped extracted stop {}: missing address", idx + 1));
            continue;
        }

        let mut stop = Stop::new(result.stops.len() as i32 + 1, stop_type, address)
            .with_window(raw.window_start, raw.window_end, raw.window_strict);
        stop.shipment_id = shipment_id;
        stop.country = raw.country.as_deref().map(normalize_country);
        stop.pallets = raw.pallets.unwrap_or(0);
        stop.weight_lbs = raw.weight_lbs.unwrap_or(0.0).max(0.0);
        stop.service_duration_minutes = raw.service_duration_minutes.filter(|m| *m > 0);
        stop.detention_hours = raw.detention_hours.unwrap_or(0.0).max(0.0);

        match raw.service_type.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
            Some(ref s) if s == "liftgate" => result.liftgate = true,
            Some(ref s) if s == "inside_delivery" || s == "inside" => result.inside_delivery = true,
            Some(ref s) if s == "reefer" => result.reefer = true,
            _ => {}
        }

        given.push((stop.weight_lbs > 0.0, stop.pallets > 0));
        result.stops.push(stop);
    }

    if result.stops.is_empty() {
        result
            .warnings
            .push("No dispatch stops could be extracted from the request.");
        return result;
    }

    for side in [StopType::Pickup, StopType::Delivery] {
        fill_side(
            &mut result.stops,
            side,
            output.total_weight_lbs,
            output.total_pallets,
            &given,
        );
    }

    result
}

/// Replace a shipment's stops with normalized extraction output.
pub fn apply_extraction(shipment: &mut Shipment, output: &ExtractionOutput) -> Warnings {
    let normalized = normalize_stops(output, Some(shipment.id));
    if normalized.stops.is_empty() {
        return normalized.warnings;
    }
    shipment.stops = normalized.stops;
    shipment.liftgate |= normalized.liftgate;
    shipment.inside_delivery |= normalized.inside_delivery;
    if normalized.reefer {
        shipment.equipment = Equipment::Reefer;
    }
    normalized.warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtractedStop;

    fn raw(stop_type: &str, address: &str) -> ExtractedStop {
        ExtractedStop {
            stop_type: stop_type.to_string(),
            address: address.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn skips_invalid_entries_and_renumbers() {
        let output = ExtractionOutput {
            stops: vec![
                raw("pickup", "Barrie, ON"),
                raw("waypoint", "Somewhere"),
                raw("delivery", "   "),
                raw("delivery", "Toronto, ON"),
            ],
            ..Default::default()
        };
        let n = normalize_stops(&output, None);
        assert_eq!(n.stops.len(), 2);
        assert_eq!(n.stops[0].sequence, 1);
        assert_eq!(n.stops[1].sequence, 2);
        assert_eq!(n.stops[1].address, "Toronto, ON");
        assert_eq!(n.warnings.len(), 2);
    }

    #[test]
    fn total_weight_split_per_side() {
        let output = ExtractionOutput {
            stops: vec![
                raw("pickup", "Barrie, ON"),
                raw("delivery", "Toronto, ON"),
                raw("delivery", "Oshawa, ON"),
            ],
            total_weight_lbs: Some(3600.0),
            ..Default::default()
        };
        let n = normalize_stops(&output, None);
        assert_eq!(n.stops[0].weight_lbs, 3600.0);
        assert_eq!(n.stops[1].weight_lbs, 1800.0);
        assert_eq!(n.stops[2].weight_lbs, 1800.0);
        // pallets estimated from weight
        assert_eq!(n.stops[0].pallets, 2);
        assert_eq!(n.stops[1].pallets, 1);
    }

    #[test]
    fn total_pallets_rounded_up_per_stop() {
        let output = ExtractionOutput {
            stops: vec![
                raw("pickup", "A"),
                raw("delivery", "B"),
                raw("delivery", "C"),
            ],
            total_pallets: Some(5),
            ..Default::default()
        };
        let n = normalize_stops(&output, None);
        assert_eq!(n.stops[0].pallets, 5);
        assert_eq!(n.stops[1].pallets, 3);
        assert_eq!(n.stops[2].pallets, 3);
    }

    #[test]
    fn explicit_values_are_kept() {
        let mut p = raw("pickup", "A");
        p.pallets = Some(4);
        p.weight_lbs = Some(5000.0);
        let output = ExtractionOutput {
            stops: vec![p, raw("delivery", "B")],
            total_weight_lbs: Some(9000.0),
            total_pallets: Some(6),
            ..Default::default()
        };
        let n = normalize_stops(&output, None);
        assert_eq!(n.stops[0].pallets, 4);
        assert_eq!(n.stops[0].weight_lbs, 5000.0);
        assert_eq!(n.stops[1].pallets, 6);
        assert_eq!(n.stops[1].weight_lbs, 9000.0);
    }

    #[test]
    fn no_load_info_leaves_zero_pallets() {
        let output = ExtractionOutput {
            stops: vec![raw("pickup", "A"), raw("delivery", "B")],
            ..Default::default()
        };
        let n = normalize_stops(&output, None);
        assert!(n.stops.iter().all(|s| s.pallets == 0 && s.weight_lbs == 0.0));
    }

    #[test]
    fn service_types_become_flags() {
        let mut d = raw("delivery", "B");
        d.service_type = Some("Liftgate".into());
        let mut p = raw("pickup", "A");
        p.service_type = Some("reefer".into());
        let output = ExtractionOutput {
            stops: vec![p, d],
            ..Default::default()
        };
        let mut shipment = Shipment::new(vec![]);
        apply_extraction(&mut shipment, &output);
        assert!(shipment.liftgate);
        assert!(!shipment.inside_delivery);
        assert_eq!(shipment.equipment, Equipment::Reefer);
        assert!(shipment.stops.iter().all(|s| s.shipment_id == Some(shipment.id)));
    }

    #[test]
    fn empty_extraction_keeps_existing_stops() {
        let mut shipment = Shipment::new(vec![Stop::pickup(1, "A"), Stop::delivery(2, "B")]);
        let warnings = apply_extraction(&mut shipment, &ExtractionOutput::default());
        assert_eq!(shipment.stops.len(), 2);
        assert!(warnings.contains("No dispatch stops"));
    }

    #[test]
    fn extraction_warnings_are_carried() {
        let output = ExtractionOutput {
            stops: vec![raw("pickup", "A"), raw("delivery", "B")],
            warnings: vec!["Pickup date unclear".into()],
            ..Default::default()
        };
        let n = normalize_stops(&output, None);
        assert!(n.warnings.contains("Pickup date unclear"));
    }
}
