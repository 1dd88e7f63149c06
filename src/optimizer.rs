//! Suche nach der günstigsten Stellplatzkombination.
//!
//! Für jeden Standort sucht der Optimierer die günstigste Teilmenge an
//! Stellplätzen, die alle angefragten Fahrzeuge aufnehmen kann:
//! - Kapazitäts-Vorfilter (verfügbare gegen benötigte Zellen)
//! - Aufzählung der Kombinationen nach Größe, günstigste zuerst
//! - Backtracking-Zuordnung der Fahrzeuge zu den Stellplätzen einer Kombination
//! - Reihenprüfung je Stellplatz (siehe `geometry`)
//!
//! Standorte werden unabhängig voneinander durchsucht; das beste Angebot
//! jedes Standorts wird nach Preis sortiert.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{Catalog, SiteGroup};
use crate::geometry::fitting_orientation;
use crate::model::{Listing, Offer, VehicleSet};
use crate::monitor::{SearchAborted, SearchBudget, SearchMonitor, SearchStats};
use crate::types::{CellSize, Footprint};

/// Konfiguration der Suchmaschine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    /// Rastereinheit für alle Längen
    pub cell_size: CellSize,
    /// Knoten- und Zeitlimit, je Standort separat angewendet
    pub budget: SearchBudget,
    /// Standorte im rayon-Threadpool statt sequentiell durchsuchen
    pub parallel_sites: bool,
}

impl SearchConfig {
    pub const DEFAULT_PARALLEL_SITES: bool = false;

    /// Erstellt einen Builder für eine benutzerdefinierte Konfiguration.
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::default()
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cell_size: CellSize::default(),
            budget: SearchBudget::unlimited(),
            parallel_sites: Self::DEFAULT_PARALLEL_SITES,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn cell_size(mut self, cell_size: CellSize) -> Self {
        self.config.cell_size = cell_size;
        self
    }

    pub fn max_nodes(mut self, max_nodes: Option<u64>) -> Self {
        self.config.budget.max_nodes = max_nodes;
        self
    }

    pub fn time_limit(mut self, time_limit: Option<Duration>) -> Self {
        self.config.budget.time_limit = time_limit;
        self
    }

    pub fn parallel_sites(mut self, parallel: bool) -> Self {
        self.config.parallel_sites = parallel;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

/// Ergebnis der Suche an einem Standort.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SiteOutcome {
    Offer(Offer),
    Infeasible,
    InsufficientCapacity { supply_cells: u64, demand_cells: u64 },
    BudgetExceeded(SearchAborted),
}

impl SiteOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            SiteOutcome::Offer(_) => "offer",
            SiteOutcome::Infeasible => "infeasible",
            SiteOutcome::InsufficientCapacity { .. } => "insufficient_capacity",
            SiteOutcome::BudgetExceeded(_) => "budget_exceeded",
        }
    }

    pub fn offer(&self) -> Option<&Offer> {
        match self {
            SiteOutcome::Offer(offer) => Some(offer),
            _ => None,
        }
    }
}

impl fmt::Display for SiteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteOutcome::Offer(offer) => write!(
                f,
                "{} listings for {} cents",
                offer.listing_ids.len(),
                offer.total_price_in_cents
            ),
            SiteOutcome::Infeasible => write!(f, "no combination of listings fits all vehicles"),
            SiteOutcome::InsufficientCapacity {
                supply_cells,
                demand_cells,
            } => write!(
                f,
                "location offers {} cells but vehicles need {}",
                supply_cells, demand_cells
            ),
            SiteOutcome::BudgetExceeded(reason) => write!(f, "{}", reason),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SiteReport {
    pub location_id: String,
    pub outcome: SiteOutcome,
    pub stats: SearchStats,
}

/// Sortierte Angebote plus Details je Standort.
#[derive(Clone, Debug, Default)]
pub struct SearchReport {
    offers: Vec<Offer>,
    sites: Vec<SiteReport>,
}

impl SearchReport {
    fn from_site_reports(sites: Vec<SiteReport>) -> Self {
        let offers = rank_offers(
            sites
                .iter()
                .filter_map(|site| site.outcome.offer().cloned())
                .collect(),
        );
        Self { offers, sites }
    }

    /// Angebote nach aufsteigendem Preis.
    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    pub fn into_offers(self) -> Vec<Offer> {
        self.offers
    }

    /// Ein Bericht pro Standort, in Katalogreihenfolge.
    pub fn sites(&self) -> &[SiteReport] {
        &self.sites
    }

    pub fn site(&self, location_id: &str) -> Option<&SiteReport> {
        self.sites.iter().find(|s| s.location_id == location_id)
    }
}

/// Ereignisse während der Suche, geeignet für Live-Fortschritt (SSE).
///
/// `OfferImproved` ist vorläufig: läuft danach das Suchbudget ab, endet der
/// Standort mit `SiteFinished { outcome_code: "budget_exceeded" }` und taucht
/// nicht unter den Angeboten auf. Verbindlich ist nur `SiteFinished`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum SearchEvent {
    /// Suche an einem Standort beginnt.
    SiteStarted { location_id: String, listings: usize },
    /// Standort vom Kapazitäts-Vorfilter übersprungen.
    SiteSkipped {
        location_id: String,
        reason_code: String,
        reason: String,
    },
    /// Eine günstigere passende Kombination wurde gefunden (vorläufig).
    OfferImproved { offer: Offer },
    /// Suche an einem Standort abgeschlossen.
    SiteFinished {
        location_id: String,
        outcome_code: String,
        stats: SearchStats,
    },
    /// Alle Standorte durchsucht.
    Finished { offers: usize, sites: usize },
}

/// Gemeinsamer, unveränderlicher Suchkontext: Katalog plus Konfiguration.
#[derive(Clone, Debug)]
pub struct SearchEngine {
    catalog: Arc<Catalog>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(catalog: Arc<Catalog>, config: SearchConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Findet das günstigste Angebot jedes Standorts.
    ///
    /// Deterministisch für Katalog und Fahrzeugmenge, auch bei paralleler
    /// Suche über die Standorte.
    pub fn search(&self, vehicles: &VehicleSet) -> SearchReport {
        if !self.config.parallel_sites {
            return self.search_with_progress(vehicles, |_| {});
        }

        let vehicle_cells = vehicles.cells(self.config.cell_size);
        let reports: Vec<SiteReport> = self
            .catalog
            .sites()
            .par_iter()
            .map(|site| {
                optimize_site(site, &vehicle_cells, &self.config, &mut |_: &SearchEvent| {})
            })
            .collect();
        SearchReport::from_site_reports(reports)
    }

    /// Sequentielle Suche, die jeden Schritt über `on_event` meldet.
    pub fn search_with_progress(
        &self,
        vehicles: &VehicleSet,
        mut on_event: impl FnMut(&SearchEvent),
    ) -> SearchReport {
        let vehicle_cells = vehicles.cells(self.config.cell_size);
        let reports: Vec<SiteReport> = self
            .catalog
            .sites()
            .iter()
            .map(|site| optimize_site(site, &vehicle_cells, &self.config, &mut on_event))
            .collect();

        let report = SearchReport::from_site_reports(reports);
        on_event(&SearchEvent::Finished {
            offers: report.offers.len(),
            sites: report.sites.len(),
        });
        report
    }
}

/// Sortiert Angebote aufsteigend nach Preis; Gleichstände behalten ihre Reihenfolge.
pub fn rank_offers(mut offers: Vec<Offer>) -> Vec<Offer> {
    offers.sort_by_key(|offer| offer.total_price_in_cents);
    offers
}

/// Durchsucht einen Standort nach der günstigsten passenden Kombination.
///
/// # Parameter
/// * `site` - Der Standort mit seinen Stellplätzen
/// * `vehicle_cells` - Fahrzeuglängen in Zellen, längste zuerst
/// * `config` - Zellgröße und Suchbudget
/// * `on_event` - Fortschritts-Callback
///
/// # Rückgabewert
/// `SiteReport` mit Ergebnis und Zählern des Standorts
pub fn optimize_site(
    site: &SiteGroup,
    vehicle_cells: &[u32],
    config: &SearchConfig,
    on_event: &mut impl FnMut(&SearchEvent),
) -> SiteReport {
    let location_id = site.location_id();
    on_event(&SearchEvent::SiteStarted {
        location_id: location_id.to_string(),
        listings: site.listings().len(),
    });

    let mut monitor = SearchMonitor::new(config.budget);
    let supply_cells = site.capacity_cells(config.cell_size);
    let demand_cells: u64 = vehicle_cells.iter().map(|&c| u64::from(c)).sum();

    let outcome = if demand_cells > supply_cells {
        let outcome = SiteOutcome::InsufficientCapacity {
            supply_cells,
            demand_cells,
        };
        on_event(&SearchEvent::SiteSkipped {
            location_id: location_id.to_string(),
            reason_code: outcome.code().to_string(),
            reason: outcome.to_string(),
        });
        outcome
    } else {
        let mut candidates: Vec<Candidate<'_>> = site
            .listings()
            .iter()
            .map(|listing| Candidate::new(listing, config.cell_size))
            .collect();
        candidates.sort_by_key(Candidate::price);

        let to_offer = |price: u64, combination: &[usize]| Offer {
            location_id: location_id.to_string(),
            listing_ids: combination
                .iter()
                .map(|&idx| candidates[idx].listing.id.clone())
                .collect(),
            total_price_in_cents: price,
        };

        let search = cheapest_combination(
            &candidates,
            vehicle_cells,
            &mut monitor,
            &mut |price: u64, combination: &[usize]| {
                on_event(&SearchEvent::OfferImproved {
                    offer: to_offer(price, combination),
                })
            },
        );

        match search {
            Ok(Some((price, combination))) => SiteOutcome::Offer(to_offer(price, &combination)),
            Ok(None) => SiteOutcome::Infeasible,
            Err(aborted) => {
                warn!("⏱️ Search for location {} aborted: {}", location_id, aborted);
                SiteOutcome::BudgetExceeded(aborted)
            }
        }
    };

    let stats = monitor.stats();
    debug!(
        location_id,
        outcome = outcome.code(),
        oracle_calls = stats.oracle_calls,
        nodes = stats.nodes,
        "location searched"
    );
    on_event(&SearchEvent::SiteFinished {
        location_id: location_id.to_string(),
        outcome_code: outcome.code().to_string(),
        stats,
    });

    SiteReport {
        location_id: location_id.to_string(),
        outcome,
        stats,
    }
}

/// Stellplatz mit in Zellen umgerechneten Maßen.
#[derive(Clone, Copy, Debug)]
struct Candidate<'a> {
    listing: &'a Listing,
    length_cells: u32,
    width_cells: u32,
}

impl<'a> Candidate<'a> {
    fn new(listing: &'a Listing, cell: CellSize) -> Self {
        Self {
            listing,
            length_cells: listing.length_cells(cell),
            width_cells: listing.width_cells(cell),
        }
    }

    fn price(&self) -> u64 {
        self.listing.price_in_cents
    }

    fn fits(&self, load: &[u32], monitor: &mut SearchMonitor) -> Result<bool, SearchAborted> {
        Ok(fitting_orientation(self.length_cells, self.width_cells, load, monitor)?.is_some())
    }
}

/// Lexikographische Indexkombinationen von `size` aus `n`.
#[derive(Debug)]
struct Combinations {
    n: usize,
    indices: Vec<usize>,
    started: bool,
    done: bool,
}

impl Combinations {
    fn new(n: usize, size: usize) -> Self {
        Self {
            n,
            indices: (0..size).collect(),
            started: false,
            done: size > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.indices.clone());
        }

        let size = self.indices.len();
        let mut i = size;
        loop {
            if i == 0 {
                self.done = true;
                return None;
            }
            i -= 1;
            if self.indices[i] != i + self.n - size {
                break;
            }
        }

        self.indices[i] += 1;
        for j in i + 1..size {
            self.indices[j] = self.indices[j - 1] + 1;
        }
        Some(self.indices.clone())
    }
}

/// Zählt Kombinationen nach Größe auf und liefert die günstigste passende.
///
/// `candidates` muss aufsteigend nach Preis sortiert sein. Kombinationen, die
/// mindestens den bisher besten Preis kosten oder deren Summe überläuft,
/// werden ohne Suche übersprungen. Kosten die `size` günstigsten Stellplätze
/// zusammen bereits mindestens den besten Preis, endet die Aufzählung.
///
/// # Rückgabewert
/// `Some((preis, indizes))` der günstigsten Kombination, `Err` bei
/// überschrittenem Suchbudget
fn cheapest_combination(
    candidates: &[Candidate<'_>],
    vehicle_cells: &[u32],
    monitor: &mut SearchMonitor,
    on_improve: &mut impl FnMut(u64, &[usize]),
) -> Result<Option<(u64, Vec<usize>)>, SearchAborted> {
    let max_size = candidates.len().min(vehicle_cells.len());
    let mut best: Option<(u64, Vec<usize>)> = None;
    let mut cheapest_of_size = 0u64;

    for size in 1..=max_size {
        // Überlauf: jede Kombination dieser Größe wäre teurer als u64::MAX
        let next_price = candidates[size - 1].price();
        let Some(lower_bound) = cheapest_of_size.checked_add(next_price) else {
            break;
        };
        cheapest_of_size = lower_bound;
        if best
            .as_ref()
            .is_some_and(|(best_price, _)| cheapest_of_size >= *best_price)
        {
            break;
        }

        for combination in Combinations::new(candidates.len(), size) {
            let price = match combination_price(candidates, &combination) {
                Some(price)
                    if !best
                        .as_ref()
                        .is_some_and(|(best_price, _)| price >= *best_price) =>
                {
                    price
                }
                _ => {
                    monitor.record_combination_pruned();
                    continue;
                }
            };

            monitor.record_combination_evaluated();
            let members: Vec<Candidate<'_>> =
                combination.iter().map(|&idx| candidates[idx]).collect();
            if assign_vehicles(&members, vehicle_cells, monitor)?.is_some() {
                on_improve(price, &combination);
                best = Some((price, combination));
            }
        }
    }

    Ok(best)
}

/// Gesamtpreis einer Kombination, `None` bei Überlauf.
fn combination_price(candidates: &[Candidate<'_>], combination: &[usize]) -> Option<u64> {
    combination
        .iter()
        .try_fold(0u64, |sum, &idx| sum.checked_add(candidates[idx].price()))
}

/// Zugeordnete Fahrzeuglängen (Zellen) je Stellplatz einer Kombination.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Assignment {
    loads: Vec<Vec<u32>>,
}

/// Ordnet jedes Fahrzeug einem Stellplatz der Kombination zu.
///
/// Fahrzeuge werden in der gegebenen Reihenfolge verteilt; nach jeder
/// vorläufigen Zuordnung wird die gesamte Last des Stellplatzes geprüft.
///
/// # Rückgabewert
/// `Some(assignment)` als Nachweis, falls eine Zuordnung existiert
fn assign_vehicles(
    combination: &[Candidate<'_>],
    vehicle_cells: &[u32],
    monitor: &mut SearchMonitor,
) -> Result<Option<Assignment>, SearchAborted> {
    let mut assignment = Assignment {
        loads: vec![Vec::new(); combination.len()],
    };
    if assign_from(0, combination, vehicle_cells, &mut assignment, monitor)? {
        Ok(Some(assignment))
    } else {
        Ok(None)
    }
}

fn assign_from(
    idx: usize,
    combination: &[Candidate<'_>],
    vehicle_cells: &[u32],
    assignment: &mut Assignment,
    monitor: &mut SearchMonitor,
) -> Result<bool, SearchAborted> {
    monitor.on_step()?;

    let Some(&vehicle) = vehicle_cells.get(idx) else {
        for (candidate, load) in combination.iter().zip(&assignment.loads) {
            if !candidate.fits(load, monitor)? {
                return Ok(false);
            }
        }
        return Ok(true);
    };

    for (slot, candidate) in combination.iter().enumerate() {
        assignment.loads[slot].push(vehicle);
        if candidate.fits(&assignment.loads[slot], monitor)?
            && assign_from(idx + 1, combination, vehicle_cells, assignment, monitor)?
        {
            return Ok(true);
        }
        assignment.loads[slot].pop();
    }
    Ok(false)
}
