//! Map Interaction Surface
//!
//! [`MapSurface`] owns a rendering surface ([`MapView`]) together with the
//! marker, the affected-radius overlay and the interaction listener. All of
//! them are acquired in [`MapSurface::mount`] and released when the surface is
//! dropped.

use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::debug;
use ts_rs::TS;

use crate::coordinate::LatLng;
use crate::dataset::{RainfallDataset, ReturnPeriod};
use crate::orchestrator::{Orchestrator, Snapshot};

pub const DEFAULT_ZOOM: u8 = 13;
pub const MAX_ZOOM: u8 = 18;
/// Metres of radius per inch/hour of peak 100-yr intensity
pub const RADIUS_SCALE_METERS: f64 = 500.0;
pub const OVERLAY_COLOR: &str = "#0ea5e9";
pub const OVERLAY_FILL_OPACITY: f64 = 0.2;

const METERS_PER_DEGREE: f64 = 111_320.0;
/// Tiles visible across the viewport when fitting bounds
const VIEWPORT_TILES: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct OverlayId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct CircleOverlay {
    pub center: LatLng,
    pub radius_meters: f64,
    pub color: String,
    pub fill_opacity: f64,
}

impl CircleOverlay {
    pub fn affected_area(center: LatLng, radius_meters: f64) -> Self {
        Self {
            center,
            radius_meters,
            color: OVERLAY_COLOR.to_string(),
            fill_opacity: OVERLAY_FILL_OPACITY,
        }
    }
}

/// The rendering surface: a map with one marker and any number of overlays
pub trait MapView {
    fn set_view(&mut self, center: LatLng, zoom: u8);
    fn marker_position(&self) -> Option<LatLng>;
    fn center(&self) -> LatLng;
    fn set_marker(&mut self, position: LatLng);
    fn pan_to(&mut self, center: LatLng);
    fn add_circle(&mut self, circle: CircleOverlay) -> OverlayId;
    fn remove_overlay(&mut self, id: OverlayId);
    fn fit_bounds(&mut self, bounds: Bounds);
    /// Release everything the view holds; called once, on teardown
    fn destroy(&mut self);
}

/// Receives `(lat, lng)` from clicks and marker drags
pub type InteractionListener = Box<dyn Fn(f64, f64) + Send + Sync>;

/// Forwards interactions to the orchestrator without keeping it alive
pub fn orchestrator_listener(orchestrator: &Arc<Orchestrator>) -> InteractionListener {
    let orchestrator: Weak<Orchestrator> = Arc::downgrade(orchestrator);
    Box::new(move |lat, lng| {
        if let Some(orchestrator) = orchestrator.upgrade() {
            orchestrator.map_interaction(lat, lng);
        }
    })
}

/// `max(100-yr intensity) × 500`, in metres
pub fn affected_radius(dataset: &RainfallDataset) -> f64 {
    dataset.max_intensity(ReturnPeriod::Hundred) * RADIUS_SCALE_METERS
}

/// Bounding box of a circle on the sphere, clamped to valid coordinates
pub fn circle_bounds(center: LatLng, radius_meters: f64) -> Bounds {
    let lat_delta = radius_meters / METERS_PER_DEGREE;
    let lng_delta = radius_meters / (METERS_PER_DEGREE * center.lat.to_radians().cos().max(1e-6));
    Bounds {
        south_west: LatLng::new(
            (center.lat - lat_delta).max(-90.0),
            (center.lng - lng_delta).max(-180.0),
        ),
        north_east: LatLng::new(
            (center.lat + lat_delta).min(90.0),
            (center.lng + lng_delta).min(180.0),
        ),
    }
}

/// Overlay currently drawn, and what it was drawn for
struct DrawnOverlay {
    id: OverlayId,
    generation: u64,
    center: LatLng,
}

pub struct MapSurface<V: MapView> {
    view: V,
    listener: Option<InteractionListener>,
    overlay: Option<DrawnOverlay>,
    /// Coordinate the marker and view were last moved to
    position: LatLng,
}

impl<V: MapView> MapSurface<V> {
    /// Initialize `view` at the snapshot's coordinate with the default zoom and a marker
    pub fn mount(mut view: V, snapshot: &Snapshot, on_interaction: InteractionListener) -> Self {
        let position = snapshot.form.coordinate().map(|c| c.to_lat_lng());
        let center = position.unwrap_or_default();
        view.set_view(center, DEFAULT_ZOOM);
        view.set_marker(center);
        debug!(lat = center.lat, lng = center.lng, "Map mounted");

        let mut surface = Self {
            view,
            listener: Some(on_interaction),
            overlay: None,
            position: center,
        };
        surface.sync_overlay(snapshot, position);
        surface
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// A click at, or a marker dropped on, `(lat, lng)`
    pub fn interact(&self, lat: f64, lng: f64) {
        if let Some(listener) = &self.listener {
            listener(lat, lng);
        }
    }

    /// Bring the view in line with `snapshot`; identical snapshots are no-ops
    pub fn sync(&mut self, snapshot: &Snapshot) {
        let position = snapshot.form.coordinate().map(|c| c.to_lat_lng());

        // Compared against the last synced coordinate, not the view center,
        // which a bounds fit may have moved
        if let Some(position) = position.filter(|p| !p.same_position(&self.position)) {
            self.position = position;
            let marker_moved = !self
                .view
                .marker_position()
                .is_some_and(|m| m.same_position(&position));
            if marker_moved {
                self.view.set_marker(position);
            }
            if !self.view.center().same_position(&position) {
                self.view.pan_to(position);
            }
        }

        self.sync_overlay(snapshot, position);
    }

    fn sync_overlay(&mut self, snapshot: &Snapshot, position: Option<LatLng>) {
        let wanted = match (snapshot.phase.dataset(), position) {
            (Some(dataset), Some(center)) => Some((dataset, center)),
            _ => None,
        };

        if let (Some((_, center)), Some(drawn)) = (&wanted, &self.overlay) {
            if drawn.generation == snapshot.generation && drawn.center.same_position(center) {
                return;
            }
        }

        if let Some(drawn) = self.overlay.take() {
            self.view.remove_overlay(drawn.id);
        }

        if let Some((dataset, center)) = wanted {
            let radius = affected_radius(dataset);
            let id = self
                .view
                .add_circle(CircleOverlay::affected_area(center, radius));
            if radius > 0.0 {
                self.view.fit_bounds(circle_bounds(center, radius));
            }
            debug!(radius_m = radius, generation = snapshot.generation, "Affected area drawn");
            self.overlay = Some(DrawnOverlay {
                id,
                generation: snapshot.generation,
                center,
            });
        }
    }
}

impl<V: MapView> Drop for MapSurface<V> {
    fn drop(&mut self) {
        if let Some(drawn) = self.overlay.take() {
            self.view.remove_overlay(drawn.id);
        }
        self.listener = None;
        self.view.destroy();
        debug!("Map unmounted");
    }
}

/// Re-sync `surface` on every published snapshot until the orchestrator is dropped
pub async fn run_map_sync<V: MapView + Send>(
    mut rx: watch::Receiver<Snapshot>,
    surface: Arc<Mutex<MapSurface<V>>>,
) {
    loop {
        let snapshot = rx.borrow_and_update().clone();
        surface.lock().await.sync(&snapshot);
        if rx.changed().await.is_err() {
            break;
        }
    }
    debug!("Map sync stopped");
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SceneOverlay {
    pub id: OverlayId,
    #[serde(flatten)]
    #[ts(flatten)]
    pub circle: CircleOverlay,
}

/// Headless view that records the scene for API clients to render
#[derive(Debug, Clone, Default, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SceneView {
    pub center: LatLng,
    pub zoom: u8,
    pub marker: Option<LatLng>,
    pub overlays: Vec<SceneOverlay>,
    pub bounds: Option<Bounds>,
    #[serde(skip)]
    #[ts(skip)]
    next_overlay: u32,
}

impl SceneView {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Highest zoom at which `bounds` fits the viewport
fn zoom_to_fit(bounds: &Bounds) -> u8 {
    let span = (bounds.north_east.lat - bounds.south_west.lat)
        .max(bounds.north_east.lng - bounds.south_west.lng)
        .max(1e-9);
    (360.0 * VIEWPORT_TILES / span)
        .log2()
        .floor()
        .clamp(0.0, f64::from(MAX_ZOOM)) as u8
}

impl MapView for SceneView {
    fn set_view(&mut self, center: LatLng, zoom: u8) {
        self.center = center;
        self.zoom = zoom.min(MAX_ZOOM);
    }

    fn marker_position(&self) -> Option<LatLng> {
        self.marker
    }

    fn center(&self) -> LatLng {
        self.center
    }

    fn set_marker(&mut self, position: LatLng) {
        self.marker = Some(position);
    }

    fn pan_to(&mut self, center: LatLng) {
        self.center = center;
    }

    fn add_circle(&mut self, circle: CircleOverlay) -> OverlayId {
        self.next_overlay += 1;
        let id = OverlayId(self.next_overlay);
        self.overlays.push(SceneOverlay { id, circle });
        id
    }

    fn remove_overlay(&mut self, id: OverlayId) {
        self.overlays.retain(|o| o.id != id);
    }

    fn fit_bounds(&mut self, bounds: Bounds) {
        self.center = bounds.center();
        self.zoom = zoom_to_fit(&bounds);
        self.bounds = Some(bounds);
    }

    fn destroy(&mut self) {
        self.overlays.clear();
        self.marker = None;
        self.bounds = None;
    }
}
