//! Reihengeometrie und Machbarkeitsprüfung für einzelne Stellplätze.
//!
//! Ein Stellplatz wird in Reihen aus Zellen zerlegt. Fahrzeuge belegen eine
//! zusammenhängende Strecke innerhalb genau einer Reihe. Pro Prüfung gilt für
//! alle Fahrzeuge eines Stellplatzes dieselbe Ausrichtung.

use std::collections::BTreeMap;

use crate::monitor::{SearchAborted, SearchMonitor};

/// Ausrichtung der Reihen innerhalb eines Stellplatzes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Fahrzeuge parallel zur Länge: `width` Reihen mit je `length` Zellen.
    Lengthwise,
    /// Um 90° gedreht: `length` Reihen mit je `width` Zellen.
    Crosswise,
}

impl Orientation {
    pub const ALL: [Orientation; 2] = [Orientation::Lengthwise, Orientation::Crosswise];
}

/// Reihenaufteilung eines Stellplatzes für eine Ausrichtung (in Zellen).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowGeometry {
    pub rows: u32,
    pub row_capacity: u32,
}

impl RowGeometry {
    /// Leitet die Reihen aus Länge und Breite (bereits in Zellen) ab.
    pub fn for_orientation(length_cells: u32, width_cells: u32, orientation: Orientation) -> Self {
        match orientation {
            Orientation::Lengthwise => Self {
                rows: width_cells,
                row_capacity: length_cells,
            },
            Orientation::Crosswise => Self {
                rows: length_cells,
                row_capacity: width_cells,
            },
        }
    }
}

/// Kanonischer Reihenzustand: Restkapazität → Anzahl Reihen.
///
/// Reihen mit gleicher Restkapazität sind austauschbar und werden daher nur
/// einmal als Verzweigung betrachtet.
#[derive(Debug)]
struct RowState {
    free: BTreeMap<u32, u32>,
}

impl RowState {
    fn uniform(geometry: RowGeometry) -> Self {
        let mut free = BTreeMap::new();
        if geometry.rows > 0 {
            free.insert(geometry.row_capacity, geometry.rows);
        }
        Self { free }
    }

    fn capacities_at_least(&self, demand: u32) -> Vec<u32> {
        self.free.range(demand..).map(|(&cap, _)| cap).collect()
    }

    fn remove(&mut self, capacity: u32) {
        if let Some(count) = self.free.get_mut(&capacity) {
            *count -= 1;
            if *count == 0 {
                self.free.remove(&capacity);
            }
        }
    }

    fn insert(&mut self, capacity: u32) {
        *self.free.entry(capacity).or_insert(0) += 1;
    }

    fn take(&mut self, capacity: u32, demand: u32) {
        self.remove(capacity);
        self.insert(capacity - demand);
    }

    fn release(&mut self, capacity: u32, demand: u32) {
        self.remove(capacity - demand);
        self.insert(capacity);
    }
}

/// Prüft per Backtracking, ob alle Fahrzeuge in die Reihen passen.
///
/// Fahrzeuge werden absteigend nach Länge platziert. Pro Fahrzeug wird jede
/// unterschiedliche Restkapazität genau einmal probiert.
///
/// # Parameter
/// * `geometry` - Anzahl Reihen und Kapazität je Reihe
/// * `vehicle_cells` - Fahrzeuglängen in Zellen (beliebige Reihenfolge)
/// * `monitor` - Budget und Zähler der laufenden Suche
///
/// # Rückgabewert
/// `Ok(true)` wenn eine vollständige Platzierung existiert, `Err` bei
/// überschrittenem Suchbudget
pub fn can_pack_into_rows(
    geometry: RowGeometry,
    vehicle_cells: &[u32],
    monitor: &mut SearchMonitor,
) -> Result<bool, SearchAborted> {
    monitor.record_oracle_call();

    let mut vehicles = vehicle_cells.to_vec();
    vehicles.sort_unstable_by(|a, b| b.cmp(a));

    // Schnellabbruch: ein Fahrzeug ist länger als jede Reihe
    if vehicles
        .first()
        .is_some_and(|&longest| longest > geometry.row_capacity)
    {
        return Ok(false);
    }

    let mut rows = RowState::uniform(geometry);
    place(&vehicles, &mut rows, monitor)
}

fn place(
    vehicles: &[u32],
    rows: &mut RowState,
    monitor: &mut SearchMonitor,
) -> Result<bool, SearchAborted> {
    let Some((&vehicle, rest)) = vehicles.split_first() else {
        return Ok(true);
    };
    monitor.on_step()?;

    for capacity in rows.capacities_at_least(vehicle) {
        rows.take(capacity, vehicle);
        let placed = place(rest, rows, monitor)?;
        rows.release(capacity, vehicle);
        if placed {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Sucht eine Ausrichtung, in der alle zugewiesenen Fahrzeuge Platz finden.
///
/// Quadratische Stellplätze werden nur einmal geprüft, da beide Ausrichtungen
/// identisch sind.
///
/// # Parameter
/// * `length_cells` - Länge des Stellplatzes in Zellen
/// * `width_cells` - Breite des Stellplatzes in Zellen
/// * `vehicle_cells` - Zugewiesene Fahrzeuglängen in Zellen
///
/// # Rückgabewert
/// `Some(orientation)` für die erste passende Ausrichtung, sonst `None`
pub fn fitting_orientation(
    length_cells: u32,
    width_cells: u32,
    vehicle_cells: &[u32],
    monitor: &mut SearchMonitor,
) -> Result<Option<Orientation>, SearchAborted> {
    if vehicle_cells.is_empty() {
        return Ok(Some(Orientation::Lengthwise));
    }

    for orientation in Orientation::ALL {
        if orientation == Orientation::Crosswise && length_cells == width_cells {
            break;
        }
        let geometry = RowGeometry::for_orientation(length_cells, width_cells, orientation);
        if can_pack_into_rows(geometry, vehicle_cells, monitor)? {
            return Ok(Some(orientation));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::SearchBudget;

    fn monitor() -> SearchMonitor {
        SearchMonitor::new(SearchBudget::unlimited())
    }

    fn rows(rows: u32, row_capacity: u32) -> RowGeometry {
        RowGeometry { rows, row_capacity }
    }

    /// Referenz ohne Symmetrie-Pruning: jede Reihe wird einzeln probiert.
    fn brute_force(geometry: RowGeometry, vehicles: &[u32]) -> bool {
        fn go(idx: usize, vehicles: &[u32], free: &mut [u32]) -> bool {
            if idx == vehicles.len() {
                return true;
            }
            for r in 0..free.len() {
                if free[r] >= vehicles[idx] {
                    free[r] -= vehicles[idx];
                    if go(idx + 1, vehicles, free) {
                        return true;
                    }
                    free[r] += vehicles[idx];
                }
            }
            false
        }
        let mut free = vec![geometry.row_capacity; geometry.rows as usize];
        go(0, vehicles, &mut free)
    }

    #[test]
    fn empty_load_always_fits() {
        assert!(can_pack_into_rows(rows(0, 0), &[], &mut monitor()).unwrap());
        assert!(can_pack_into_rows(rows(2, 3), &[], &mut monitor()).unwrap());
    }

    #[test]
    fn no_rows_cannot_hold_vehicles() {
        assert!(!can_pack_into_rows(rows(0, 5), &[0], &mut monitor()).unwrap());
    }

    #[test]
    fn rejects_vehicle_longer_than_row() {
        let mut mon = monitor();
        assert!(!can_pack_into_rows(rows(10, 2), &[3], &mut mon).unwrap());
        assert_eq!(mon.stats().nodes, 0);
    }

    #[test]
    fn fills_rows_exactly() {
        assert!(can_pack_into_rows(rows(2, 5), &[3, 2, 4, 1], &mut monitor()).unwrap());
        assert!(!can_pack_into_rows(rows(2, 5), &[3, 3, 3], &mut monitor()).unwrap());
    }

    #[test]
    fn matches_brute_force_on_small_instances() {
        let cases: &[(u32, u32, &[u32])] = &[
            (1, 3, &[1, 1, 1]),
            (2, 4, &[3, 3, 2]),
            (3, 4, &[2, 2, 2, 2, 2, 2]),
            (3, 5, &[3, 3, 2, 2, 2]),
            (2, 6, &[4, 3, 3, 2]),
            (2, 6, &[4, 4, 2, 1]),
            (4, 3, &[3, 2, 2, 1, 1]),
        ];
        for &(r, cap, vehicles) in cases {
            let geometry = rows(r, cap);
            assert_eq!(
                can_pack_into_rows(geometry, vehicles, &mut monitor()).unwrap(),
                brute_force(geometry, vehicles),
                "Abweichung bei {} Reihen à {} Zellen für {:?}",
                r,
                cap,
                vehicles
            );
        }
    }

    #[test]
    fn symmetry_pruning_visits_fewer_nodes() {
        // 5 gleiche Reihen, 6 Fahrzeuge: ohne Pruning exponentiell viele Versuche
        let mut mon = monitor();
        assert!(!can_pack_into_rows(rows(5, 3), &[2, 2, 2, 2, 2, 2], &mut mon).unwrap());
        assert!(mon.stats().nodes < 100);
    }

    #[test]
    fn orientation_geometry() {
        assert_eq!(
            RowGeometry::for_orientation(3, 1, Orientation::Lengthwise),
            rows(1, 3)
        );
        assert_eq!(
            RowGeometry::for_orientation(3, 1, Orientation::Crosswise),
            rows(3, 1)
        );
    }

    #[test]
    fn falls_back_to_crosswise_orientation() {
        // 1 × 4 Zellen: längs vier Reihen à 1 Zelle, quer eine Reihe à 4 Zellen
        let found = fitting_orientation(1, 4, &[2, 2], &mut monitor()).unwrap();
        assert_eq!(found, Some(Orientation::Crosswise));

        let found = fitting_orientation(4, 1, &[2, 2], &mut monitor()).unwrap();
        assert_eq!(found, Some(Orientation::Lengthwise));
    }

    #[test]
    fn square_listing_checks_one_orientation() {
        let mut mon = monitor();
        let found = fitting_orientation(2, 2, &[3], &mut mon).unwrap();
        assert_eq!(found, None);
        assert_eq!(mon.stats().oracle_calls, 1);

        for vehicles in [&[1u32, 1, 1][..], &[2, 2], &[2, 2, 1]] {
            let lengthwise =
                can_pack_into_rows(rows(2, 2), vehicles, &mut monitor()).unwrap();
            let crosswise = can_pack_into_rows(
                RowGeometry::for_orientation(2, 2, Orientation::Crosswise),
                vehicles,
                &mut monitor(),
            )
            .unwrap();
            assert_eq!(lengthwise, crosswise);
        }
    }

    #[test]
    fn budget_aborts_row_search() {
        let budget = SearchBudget {
            max_nodes: Some(2),
            time_limit: None,
        };
        let mut mon = SearchMonitor::new(budget);
        let result = can_pack_into_rows(rows(3, 3), &[1, 1, 1, 1, 1, 1, 1], &mut mon);
        assert_eq!(result, Err(SearchAborted::NodeBudget(2)));
    }
}
