//! Derived statistics over fuel and service entries.
//!
//! Every function here is pure: it takes whatever slice it is given, sorts a
//! private copy when order matters, and never fails. Insufficient data yields
//! `0.0` for efficiency and spend figures and `None` for day counts.

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::models::{FuelEntry, ServiceEntry, Vehicle};

/// Days without service after which a vehicle is considered overdue.
pub const SERVICE_OVERDUE_DAYS: i64 = 150;

/// Marker rendered in place of a missing date.
pub const NOT_AVAILABLE: &str = "N/A";

/// Efficiency of a single trip, dated by the fill-up that closed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripEfficiency {
    pub date: NaiveDate,
    pub mileage: f64,
}

/// A fuel entry together with the trip it closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuelHistoryRow {
    pub entry: FuelEntry,
    pub trip_distance: Option<f64>,
    pub efficiency: Option<f64>,
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn is_positive(value: f64) -> bool {
    value > 0.0
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn by_odometer_ascending(entries: &[FuelEntry]) -> Vec<&FuelEntry> {
    let mut sorted: Vec<&FuelEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.odometer.total_cmp(&b.odometer));
    sorted
}

/// The two highest odometer readings, highest first. The sort is stable, so
/// among equal readings the entry listed first counts as the latest.
fn latest_pair(entries: &[FuelEntry]) -> Option<(&FuelEntry, &FuelEntry)> {
    if entries.len() < 2 {
        return None;
    }
    let mut sorted: Vec<&FuelEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.odometer.total_cmp(&a.odometer));
    Some((sorted[0], sorted[1]))
}

/// Efficiency of the most recent trip.
///
/// The latest fill's liters are the fuel burned since the previous fill, so
/// the distance between the two highest odometer readings is divided by the
/// latest entry's liters.
pub fn last_efficiency(entries: &[FuelEntry]) -> f64 {
    let Some((latest, previous)) = latest_pair(entries) else {
        return 0.0;
    };

    if !is_positive(latest.liters) {
        return 0.0;
    }

    round2((latest.odometer - previous.odometer) / latest.liters)
}

/// Efficiency across the whole log.
///
/// Fuel bought at the earliest entry predates the measured distance and is
/// excluded from the total.
pub fn average_efficiency(entries: &[FuelEntry]) -> f64 {
    if entries.len() < 2 {
        return 0.0;
    }

    let sorted = by_odometer_ascending(entries);
    let first = sorted[0];
    let last = sorted[sorted.len() - 1];

    let total_distance = last.odometer - first.odometer;
    let total_fuel: f64 = sorted[1..].iter().map(|e| finite_or_zero(e.liters)).sum();

    if !is_positive(total_fuel) {
        return 0.0;
    }

    round2(total_distance / total_fuel)
}

/// One efficiency figure per consecutive pair of fill-ups, most recent first.
pub fn all_trip_efficiencies(entries: &[FuelEntry]) -> Vec<TripEfficiency> {
    let sorted = by_odometer_ascending(entries);

    let mut trips: Vec<TripEfficiency> = sorted
        .windows(2)
        .filter(|pair| is_positive(pair[1].liters))
        .map(|pair| TripEfficiency {
            date: pair[1].date,
            mileage: round2((pair[1].odometer - pair[0].odometer) / pair[1].liters),
        })
        .collect();

    trips.sort_by(|a, b| b.date.cmp(&a.date));
    trips
}

/// Fuel plus service spend.
pub fn total_spend(fuel_entries: &[FuelEntry], service_entries: &[ServiceEntry]) -> f64 {
    let fuel: f64 = fuel_entries
        .iter()
        .map(|e| finite_or_zero(e.total_cost))
        .sum();
    let service: f64 = service_entries
        .iter()
        .map(|e| finite_or_zero(e.cost))
        .sum();
    round2(fuel + service)
}

/// Whole calendar days between `today` and the most recent service.
pub fn days_since_last_service(entries: &[ServiceEntry], today: NaiveDate) -> Option<i64> {
    let latest = entries.iter().map(|e| e.date).max()?;
    Some((today - latest).num_days())
}

/// [`days_since_last_service`] against the local calendar date.
pub fn days_since_last_service_today(entries: &[ServiceEntry]) -> Option<i64> {
    days_since_last_service(entries, Local::now().date_naive())
}

pub fn is_service_overdue(days_since_service: Option<i64>) -> bool {
    matches!(days_since_service, Some(days) if days > SERVICE_OVERDUE_DAYS)
}

/// Renders a date as `DD/MM/YY`.
pub fn format_display_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.format("%d/%m/%y").to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Trip distance and efficiency for every entry, most recent first.
///
/// Each entry is compared with the one before it by date; the oldest entry
/// has no trip.
pub fn fuel_history(entries: &[FuelEntry]) -> Vec<FuelHistoryRow> {
    let mut chronological: Vec<&FuelEntry> = entries.iter().collect();
    chronological.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.odometer.total_cmp(&b.odometer))
    });

    let mut rows: Vec<FuelHistoryRow> = chronological
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let previous = idx.checked_sub(1).map(|p| chronological[p]);
            let trip_distance = previous.map(|prev| entry.odometer - prev.odometer);
            let efficiency = trip_distance
                .filter(|_| is_positive(entry.liters))
                .map(|distance| round2(distance / entry.liters));

            FuelHistoryRow {
                entry: (*entry).clone(),
                trip_distance,
                efficiency,
            }
        })
        .collect();

    rows.reverse();
    rows
}

/// Total cost suggested while filling in a fuel entry form.
pub fn suggested_total_cost(liters: f64, price: f64) -> Option<f64> {
    if is_positive(liters) && is_positive(price) && (liters * price).is_finite() {
        Some(round2(liters * price))
    } else {
        None
    }
}

/// Price per liter suggested when the total cost is typed first.
pub fn suggested_price(total_cost: f64, liters: f64) -> Option<f64> {
    if is_positive(liters) && total_cost.is_finite() && total_cost >= 0.0 {
        Some(round2(total_cost / liters))
    } else {
        None
    }
}

/// The figures shown on a vehicle card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSummary {
    pub vehicle_id: String,
    pub name: String,
    pub fill_count: usize,
    pub last_efficiency: f64,
    pub average_efficiency: f64,
    pub fuel_spend: f64,
    pub total_spend: f64,
    pub last_fill: Option<NaiveDate>,
    pub days_since_service: Option<i64>,
    pub service_overdue: bool,
}

impl VehicleSummary {
    pub fn compute(
        vehicle: &Vehicle,
        fuel_entries: &[FuelEntry],
        service_entries: &[ServiceEntry],
        today: NaiveDate,
    ) -> Self {
        let days_since_service = days_since_last_service(service_entries, today);
        Self {
            vehicle_id: vehicle.id.clone(),
            name: vehicle.name.clone(),
            fill_count: fuel_entries.len(),
            last_efficiency: last_efficiency(fuel_entries),
            average_efficiency: average_efficiency(fuel_entries),
            fuel_spend: total_spend(fuel_entries, &[]),
            total_spend: total_spend(fuel_entries, service_entries),
            last_fill: fuel_entries.iter().map(|e| e.date).max(),
            days_since_service,
            service_overdue: is_service_overdue(days_since_service),
        }
    }
}
