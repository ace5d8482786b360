//! Per-session view state and the transitions that keep every dependent view
//! in step with it.

use crate::aggregate::{base_layer, build_bundle, BaseLayer, LayerBundle};
use crate::cache::{Evicted, LayerCache};
use crate::click::{resolve_click, ClickResolution};
use crate::error::{AtlasError, AtlasResult};
use crate::store::GeometryStore;
use crate::types::{BoundaryLevel, DatasetId, Demographic};
use crate::views::{tabs, BaseLayerEntry, Chart, Hover, Legend, Popup, Tab};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Renderer collaborator. Receives view models, never mutates session state.
pub trait MapView {
    fn show_loading(&mut self);
    fn hide_loading(&mut self);
    fn notify_failure(&mut self, error: &AtlasError);
    fn add_base_layer(&mut self, layer: &BaseLayer, entry: &BaseLayerEntry);
    fn show_base_layer(&mut self, level: BoundaryLevel);
    /// Attach the point layer and the aggregated polygons of `level`.
    fn attach(&mut self, bundle: &LayerBundle, level: BoundaryLevel);
    fn detach(&mut self, dataset: DatasetId, level: BoundaryLevel);
    /// Release anything built for a bundle that left the cache.
    fn discard(&mut self, dataset: DatasetId);
    fn restyle_choropleth(&mut self, demographic: Demographic);
    fn render_tabs(&mut self, tabs: &[Tab]);
    fn render_legend(&mut self, legend: &Legend);
    fn render_chart(&mut self, chart: &Chart);
    fn show_popup(&mut self, popup: &Popup);
    fn close_popup(&mut self);
    fn render_hover(&mut self, hover: &Hover);
    /// Return the hover panel to its idle prompt.
    fn reset_hover(&mut self);
}

/// Data collaborator answering the session's queries.
pub trait AtlasBackend {
    fn base_layer(&self, level: BoundaryLevel) -> impl Future<Output = AtlasResult<BaseLayer>> + Send;
    fn bundle(&self, dataset: DatasetId) -> impl Future<Output = AtlasResult<LayerBundle>> + Send;
    fn resolve_click(&self, lat: f64, lon: f64) -> impl Future<Output = AtlasResult<ClickResolution>> + Send;
}

/// Backend computing everything in-process against a geometry store.
#[derive(Clone)]
pub struct LocalBackend {
    store: Arc<dyn GeometryStore>,
}

impl LocalBackend {
    pub fn new(store: Arc<dyn GeometryStore>) -> Self {
        Self { store }
    }
}

impl AtlasBackend for LocalBackend {
    async fn base_layer(&self, level: BoundaryLevel) -> AtlasResult<BaseLayer> {
        base_layer(self.store.as_ref(), level)
    }

    async fn bundle(&self, dataset: DatasetId) -> AtlasResult<LayerBundle> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || build_bundle(store.as_ref(), dataset))
            .await
            .map_err(|e| AtlasError::DataSource(format!("aggregation task failed: {e}")))?
    }

    async fn resolve_click(&self, lat: f64, lon: f64) -> AtlasResult<ClickResolution> {
        resolve_click(self.store.as_ref(), lat, lon)
    }
}

/// The single authoritative view state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CurrentState {
    pub active_dataset: Option<DatasetId>,
    pub boundary_level: BoundaryLevel,
    pub demographic: Demographic,
}

/// Identifies one in-flight dataset load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub dataset: DatasetId,
    sequence: u64,
}

/// Outcome of [`Session::request_dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Already the active dataset.
    Unchanged,
    /// Served from the cache and displayed.
    Ready,
    /// Needs aggregating; hand the result to [`Session::complete_load`].
    Pending(LoadTicket),
}

/// Feature under the pointer, by position in the layer it was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverTarget {
    /// Polygon of a demographic base layer.
    Base(BoundaryLevel, usize),
    /// Polygon of the active dataset's layer at the current level.
    Aggregated(usize),
    /// Facility of the active dataset.
    Facility(usize),
}

/// Session context passed to every transition.
#[derive(Default)]
pub struct Session {
    state: CurrentState,
    cache: LayerCache,
    active: Option<Arc<LayerBundle>>,
    // sublayer currently on the map
    attached: Option<(DatasetId, BoundaryLevel)>,
    base_layers: Vec<BaseLayer>,
    pending: Option<LoadTicket>,
    next_sequence: u64,
    hovered: Option<HoverTarget>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the four demographic base layers, finest first, and shows provinces.
    pub async fn initialize<B: AtlasBackend, V: MapView>(backend: &B, view: &mut V) -> AtlasResult<Self> {
        let mut session = Self::new();
        view.show_loading();

        // nothing reaches the view unless every level loads
        for level in BoundaryLevel::ALL.into_iter().rev() {
            match backend.base_layer(level).await {
                Ok(layer) => session.base_layers.push(layer),
                Err(e) => {
                    view.hide_loading();
                    view.notify_failure(&e);
                    return Err(e);
                }
            }
        }

        for layer in &session.base_layers {
            let entry = BaseLayerEntry {
                level: layer.level,
                name: layer.level.layer_name(),
                visible: layer.level == session.state.boundary_level,
            };
            view.add_base_layer(layer, &entry);
        }

        view.render_tabs(&tabs(None));
        view.render_legend(&session.legend());
        view.hide_loading();
        info!(levels = session.base_layers.len(), "base layers loaded");
        Ok(session)
    }

    pub fn state(&self) -> CurrentState {
        self.state
    }

    pub fn cache(&self) -> &LayerCache {
        &self.cache
    }

    pub fn active_bundle(&self) -> Option<&Arc<LayerBundle>> {
        self.active.as_ref()
    }

    pub fn base_layer(&self, level: BoundaryLevel) -> Option<&BaseLayer> {
        self.base_layers.iter().find(|layer| layer.level == level)
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn hovered(&self) -> Option<HoverTarget> {
        self.hovered
    }

    pub fn legend(&self) -> Legend {
        Legend::build(self.state.demographic, self.active.as_deref())
    }

    pub fn chart(&self) -> Option<Chart> {
        self.active
            .as_deref()
            .map(|bundle| Chart::build(bundle, self.state.boundary_level, self.state.demographic))
    }

    /// Selects a dataset, aggregating it through `backend` on a cache miss.
    ///
    /// On failure the state is left as it was and the view is told why.
    pub async fn select_dataset<B: AtlasBackend, V: MapView>(
        &mut self,
        dataset: DatasetId,
        backend: &B,
        view: &mut V,
    ) -> AtlasResult<()> {
        match self.request_dataset(dataset, view) {
            Selection::Pending(ticket) => {
                let result = backend.bundle(ticket.dataset).await;
                self.complete_load(ticket, result, view)
            }
            Selection::Unchanged | Selection::Ready => Ok(()),
        }
    }

    /// First half of a dataset selection. A newer request supersedes any load
    /// still in flight.
    pub fn request_dataset<V: MapView>(&mut self, dataset: DatasetId, view: &mut V) -> Selection {
        let superseded = self.pending.take();

        if self.state.active_dataset == Some(dataset) {
            if superseded.is_some() {
                view.hide_loading();
            }
            return Selection::Unchanged;
        }

        if let Some(bundle) = self.cache.get(dataset) {
            debug!(dataset = %dataset, "layer cache hit");
            if superseded.is_some() {
                view.hide_loading();
            }
            self.activate(bundle, view);
            return Selection::Ready;
        }

        let ticket = LoadTicket {
            dataset,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.pending = Some(ticket);
        if superseded.is_none() {
            view.show_loading();
        }
        debug!(dataset = %dataset, "layer cache miss, aggregating");
        Selection::Pending(ticket)
    }

    /// Second half of a dataset selection.
    ///
    /// Results for superseded tickets are cached but not displayed.
    pub fn complete_load<V: MapView>(
        &mut self,
        ticket: LoadTicket,
        result: AtlasResult<LayerBundle>,
        view: &mut V,
    ) -> AtlasResult<()> {
        let current = self.pending == Some(ticket);

        let bundle = match result {
            Ok(bundle) => bundle,
            Err(e) if current => {
                self.pending = None;
                view.hide_loading();
                view.notify_failure(&e);
                warn!(dataset = %ticket.dataset, error = %e, "dataset load failed");
                return Err(e);
            }
            Err(e) => {
                warn!(dataset = %ticket.dataset, error = %e, "superseded dataset load failed");
                return Ok(());
            }
        };

        if !current {
            self.cache_stale(ticket.dataset, bundle, view);
            return Ok(());
        }

        self.pending = None;
        let bundle = self.cache_bundle(ticket.dataset, Arc::new(bundle), view);
        self.activate(bundle, view);
        view.hide_loading();
        Ok(())
    }

    pub fn select_boundary_level<V: MapView>(&mut self, level: BoundaryLevel, view: &mut V) -> AtlasResult<()> {
        if self.pending.is_some() {
            return Err(AtlasError::Busy);
        }
        if self.state.boundary_level == level {
            return Ok(());
        }

        view.close_popup();
        self.drop_hover(view);
        self.state.boundary_level = level;
        view.show_base_layer(level);

        if let Some(bundle) = self.active.clone() {
            if let Some((dataset, old_level)) = self.attached.take() {
                view.detach(dataset, old_level);
            }
            view.attach(&bundle, level);
            self.attached = Some((bundle.dataset, level));
            if let Some(chart) = self.chart() {
                view.render_chart(&chart);
            }
        }

        view.render_legend(&self.legend());
        Ok(())
    }

    pub fn select_demographic<V: MapView>(&mut self, demographic: Demographic, view: &mut V) -> AtlasResult<()> {
        if self.pending.is_some() {
            return Err(AtlasError::Busy);
        }
        if self.state.demographic == demographic {
            return Ok(());
        }

        view.close_popup();
        self.state.demographic = demographic;
        if let Some(chart) = self.chart() {
            view.render_chart(&chart);
        }
        view.render_legend(&self.legend());
        view.restyle_choropleth(demographic);
        if let Some(hover) = self.hovered.and_then(|target| self.build_hover(target)) {
            view.render_hover(&hover);
        }
        Ok(())
    }

    /// Describes a polygon of the base layer at `level`.
    pub fn hover_base<V: MapView>(&mut self, level: BoundaryLevel, index: usize, view: &mut V) -> bool {
        self.show_hover(HoverTarget::Base(level, index), view)
    }

    /// Describes a polygon of the active dataset at the current boundary level.
    pub fn hover_aggregated<V: MapView>(&mut self, index: usize, view: &mut V) -> bool {
        self.show_hover(HoverTarget::Aggregated(index), view)
    }

    pub fn hover_facility<V: MapView>(&mut self, index: usize, view: &mut V) -> bool {
        self.show_hover(HoverTarget::Facility(index), view)
    }

    /// Pointer left the feature.
    pub fn clear_hover<V: MapView>(&mut self, view: &mut V) {
        self.hovered = None;
        view.reset_hover();
    }

    fn build_hover(&self, target: HoverTarget) -> Option<Hover> {
        let level = self.state.boundary_level;
        let demographic = self.state.demographic;
        match target {
            HoverTarget::Base(base_level, index) => self
                .base_layer(base_level)?
                .polygons
                .get(index)
                .map(|polygon| Hover::boundary(polygon, base_level, demographic)),
            HoverTarget::Aggregated(index) => self
                .active
                .as_deref()?
                .boundary_layer(level)
                .get(index)
                .map(|polygon| Hover::aggregated(polygon, level, demographic)),
            HoverTarget::Facility(index) => self.active.as_deref()?.points.get(index).map(Hover::facility),
        }
    }

    /// Unknown layers and out-of-range indices leave the panel as it is.
    fn show_hover<V: MapView>(&mut self, target: HoverTarget, view: &mut V) -> bool {
        match self.build_hover(target) {
            Some(hover) => {
                self.hovered = Some(target);
                view.render_hover(&hover);
                true
            }
            None => false,
        }
    }

    fn drop_hover<V: MapView>(&mut self, view: &mut V) {
        if self.hovered.take().is_some() {
            view.reset_hover();
        }
    }

    /// Shows what lies under a clicked coordinate at every boundary level.
    ///
    /// Leaves the state untouched; a location outside all geometry shows nothing.
    pub async fn click_at<B: AtlasBackend, V: MapView>(
        &self,
        lat: f64,
        lon: f64,
        backend: &B,
        view: &mut V,
    ) -> AtlasResult<ClickResolution> {
        let resolution = match backend.resolve_click(lat, lon).await {
            Ok(resolution) => resolution,
            Err(e) => {
                view.notify_failure(&e);
                return Err(e);
            }
        };
        if resolution.is_empty() {
            return Ok(resolution);
        }

        let popup = Popup::build(
            lat,
            lon,
            &resolution,
            self.state.boundary_level,
            self.state.demographic,
        );
        if let (Some(mut chart), Some(id)) = (self.chart(), popup.highlight_id.as_deref()) {
            chart.highlight(id);
            view.render_chart(&chart);
        }
        view.show_popup(&popup);
        Ok(resolution)
    }

    fn activate<V: MapView>(&mut self, bundle: Arc<LayerBundle>, view: &mut V) {
        let level = self.state.boundary_level;
        if let Some((dataset, old_level)) = self.attached.take() {
            view.detach(dataset, old_level);
        }
        // base polygons stay on the map; anything drawn from the old bundle goes
        if matches!(self.hovered, Some(HoverTarget::Aggregated(_) | HoverTarget::Facility(_))) {
            self.drop_hover(view);
        }
        view.close_popup();
        view.attach(&bundle, level);

        self.attached = Some((bundle.dataset, level));
        self.state.active_dataset = Some(bundle.dataset);
        self.active = Some(bundle);

        view.render_tabs(&tabs(self.state.active_dataset));
        if let Some(chart) = self.chart() {
            view.render_chart(&chart);
        }
        view.render_legend(&self.legend());
    }

    /// Inserts into the cache, tearing down whatever the insert evicted.
    fn cache_bundle<V: MapView>(
        &mut self,
        dataset: DatasetId,
        bundle: Arc<LayerBundle>,
        view: &mut V,
    ) -> Arc<LayerBundle> {
        if let Some(Evicted { dataset: evicted, .. }) = self.cache.put(dataset, Arc::clone(&bundle)) {
            if let Some((attached, level)) = self.attached {
                if attached == evicted {
                    view.detach(attached, level);
                    self.attached = None;
                }
            }
            view.discard(evicted);
        }
        // an equal bundle may already be resident; keep that one
        self.cache.get(dataset).unwrap_or(bundle)
    }

    fn cache_stale<V: MapView>(&mut self, dataset: DatasetId, bundle: LayerBundle, view: &mut V) {
        let would_evict_active = self.cache.len() >= crate::cache::CAPACITY
            && !self.cache.contains(dataset)
            && self.cache.list().first().copied() == self.state.active_dataset;
        if would_evict_active {
            debug!(dataset = %dataset, "dropping superseded result to keep the active dataset resident");
            return;
        }
        debug!(dataset = %dataset, "caching superseded result without displaying it");
        self.cache_bundle(dataset, Arc::new(bundle), view);
    }
}
