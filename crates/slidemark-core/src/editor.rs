//! The annotation editor: open annotations, drawing, styling and saving.
//!
//! The editor owns all in-memory state and is driven by input events and
//! timer ticks. Remote work is handed out as [`SaveJob`]s that the caller
//! runs against an [`AnnotationStore`] without holding the editor, and whose
//! results come back through [`Editor::complete_save`].

use crate::annotation::{Annotation, AnnotationId};
use crate::brush::{BrushEmission, BrushStroke};
use crate::camera::Camera;
use crate::compose::{CompositionOutcome, ShapeComposer};
use crate::config::EditorConfig;
use crate::elements::{Element, ElementId};
use crate::geometry::{BooleanOp, GeometryEngine, Polygon};
use crate::painter::{PixelmapDebouncer, RedrawQueue};
use crate::shortcuts::{EditorAction, action_for_key};
use crate::storage::{
    AnnotationStore, SaveRequest, SaveScheduler, SaveState, StoreError, StoreResult, StyleStore,
};
use crate::style::{StyleError, StyleGroup, StyleGroupRegistry, reconcile_pixelmap};
use crate::tools::{DrawMode, DrawSession};
use kurbo::{Point, Rect, Vec2};

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// A style registry change that still has to reach the style store.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleWrite {
    Add(StyleGroup),
    Save(StyleGroup),
    Destroy(String),
}

/// One remote operation handed out by [`Editor::take_save_jobs`].
#[derive(Debug, Clone, PartialEq)]
pub enum SaveJob {
    /// Create or update the store's copy with this snapshot.
    Write(Annotation),
    Delete(AnnotationId),
    /// Re-fetch for a refresh.
    Fetch(AnnotationId),
}

/// Result of a [`SaveJob`], fed back through [`Editor::complete_save`].
#[derive(Debug)]
pub enum SaveOutcome {
    Written {
        id: AnnotationId,
        /// Version of the snapshot that was written.
        version: u64,
        result: StoreResult<()>,
    },
    Deleted {
        id: AnnotationId,
        result: StoreResult<()>,
    },
    Fetched {
        id: AnnotationId,
        result: StoreResult<Annotation>,
    },
}

impl SaveJob {
    pub fn id(&self) -> AnnotationId {
        match self {
            SaveJob::Write(annotation) => annotation.id,
            SaveJob::Delete(id) | SaveJob::Fetch(id) => *id,
        }
    }

    /// Perform the job against a store. Unsaved annotations are created,
    /// known ones updated.
    pub async fn run<S: AnnotationStore + ?Sized>(self, store: &S) -> SaveOutcome {
        match self {
            SaveJob::Write(snapshot) => {
                let result = if snapshot.is_persisted() {
                    store.update(&snapshot).await
                } else {
                    store.create(&snapshot).await
                };
                SaveOutcome::Written {
                    id: snapshot.id,
                    version: snapshot.version,
                    result,
                }
            }
            SaveJob::Delete(id) => SaveOutcome::Deleted {
                id,
                result: store.destroy(id).await,
            },
            SaveJob::Fetch(id) => SaveOutcome::Fetched {
                id,
                result: store.fetch(id).await,
            },
        }
    }
}

/// Annotation editor over one image.
pub struct Editor<E: GeometryEngine> {
    config: EditorConfig,
    engine: E,
    user: String,
    annotations: Vec<Annotation>,
    active: Option<AnnotationId>,
    registry: StyleGroupRegistry,
    style_writes: Vec<StyleWrite>,
    scheduler: SaveScheduler,
    pending_fetches: Vec<AnnotationId>,
    debouncer: PixelmapDebouncer,
    redraws: RedrawQueue,
    camera: Camera,
    session: DrawSession,
    brush: BrushStroke,
}

impl<E: GeometryEngine> Editor<E> {
    /// Create an editor for `user` with only the default style group.
    pub fn new(config: EditorConfig, engine: E, user: impl Into<String>) -> Self {
        let registry = StyleGroupRegistry::new(config.default_group.clone());
        Self::with_registry(config, engine, user, registry)
    }

    /// Create an editor with a loaded style registry.
    pub fn with_registry(
        config: EditorConfig,
        engine: E,
        user: impl Into<String>,
        registry: StyleGroupRegistry,
    ) -> Self {
        let camera = Camera::new();
        let mut brush = BrushStroke::new(config.brush.shape, config.brush.size_px);
        if let Some(world) = config.brush.world_size {
            brush = brush.with_world_size(world, camera.units_per_pixel());
        }
        Self {
            scheduler: SaveScheduler::new(config.save_backoff.into()),
            pending_fetches: Vec::new(),
            debouncer: PixelmapDebouncer::new(Duration::from_millis(config.pixelmap_debounce_ms)),
            engine,
            user: user.into(),
            annotations: Vec::new(),
            active: None,
            registry,
            style_writes: Vec::new(),
            redraws: RedrawQueue::new(),
            camera,
            session: DrawSession::new(),
            brush,
            config,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry(&self) -> &StyleGroupRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &SaveScheduler {
        &self.scheduler
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn session(&self) -> &DrawSession {
        &self.session
    }

    pub fn brush(&self) -> &BrushStroke {
        &self.brush
    }

    /// Whether any annotation is saving or waiting to retry.
    pub fn is_saving(&self) -> bool {
        self.scheduler.is_saving()
    }

    // --- Annotations ---

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    fn annotation_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    pub fn active(&self) -> Option<AnnotationId> {
        self.active
    }

    pub fn set_active(&mut self, id: Option<AnnotationId>) {
        self.active = id.filter(|id| self.annotation(*id).is_some());
        if self.active.is_none() {
            self.cancel();
        }
    }

    /// Create a new annotation, make it active and schedule its creation.
    pub fn create_annotation(&mut self, name: impl Into<String>) -> AnnotationId {
        let annotation = Annotation::new(name);
        let id = annotation.id;
        self.annotations.push(annotation);
        self.active = Some(id);
        self.mark_mutated(id);
        log::info!("Created annotation {}", id);
        id
    }

    /// Open an annotation fetched from the store.
    pub fn open_annotation(&mut self, remote: Annotation) -> AnnotationId {
        let annotation = Annotation::from_remote(remote);
        let id = annotation.id;
        match self.annotations.iter().position(|a| a.id == id) {
            Some(index) => self.annotations[index] = annotation,
            None => self.annotations.push(annotation),
        }
        self.reconcile_annotation(id);
        self.redraws.request(id);
        id
    }

    /// Apply an edit to an annotation and schedule a save.
    pub fn mutate<F, R>(&mut self, id: AnnotationId, f: F) -> Option<R>
    where
        F: FnOnce(&mut Annotation) -> R,
    {
        let annotation = self.annotation_mut(id)?;
        let result = f(annotation);
        annotation.touch();
        self.mark_mutated(id);
        Some(result)
    }

    /// Remove an annotation locally and schedule its remote deletion.
    pub fn delete_annotation(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        let annotation = self.annotations.remove(index);
        if self.active == Some(id) {
            self.active = None;
            self.cancel();
        }
        self.debouncer.discard(id);
        if annotation.is_persisted() || self.scheduler.state(id) != SaveState::Idle {
            self.scheduler.notify_delete_requested(id);
        }
        log::info!("Deleted annotation {}", id);
        Some(annotation)
    }

    /// Show every annotation, or hide them all if any is shown.
    pub fn toggle_annotations(&mut self) -> bool {
        let show = !self.annotations.iter().any(|a| a.displayed);
        for annotation in &mut self.annotations {
            annotation.displayed = show;
            self.redraws.request(annotation.id);
        }
        show
    }

    /// Elements of displayed annotations lying entirely inside a polygon.
    pub fn elements_in_polygon(&self, polygon: &[Point]) -> Vec<(AnnotationId, ElementId)> {
        let tolerance = self.config.flatten_tolerance_px * self.camera.units_per_pixel();
        self.annotations
            .iter()
            .filter(|a| a.displayed)
            .flat_map(|a| {
                a.elements
                    .polygon_search(polygon, false, tolerance)
                    .into_iter()
                    .map(move |element| (a.id, element))
            })
            .collect()
    }

    /// Elements of displayed annotations lying entirely inside a box.
    pub fn elements_in_box(&self, rect: Rect) -> Vec<(AnnotationId, ElementId)> {
        self.elements_in_polygon(&Polygon::from_rect(rect).exterior)
    }

    /// Annotations that need redrawing this frame.
    pub fn take_redraws(&mut self) -> Vec<AnnotationId> {
        self.redraws.take_frame()
    }

    fn mark_mutated(&mut self, id: AnnotationId) {
        self.scheduler.notify_mutated(id);
        self.redraws.request(id);
    }

    // --- Drawing ---

    /// Handle a finished shape drawn on the active annotation.
    ///
    /// Shapes are composed with existing elements when a boolean operation is
    /// given; otherwise, or if composition does not apply, they are added as
    /// new elements in the active style group.
    pub fn complete_shapes(
        &mut self,
        shapes: Vec<Element>,
        op: Option<BooleanOp>,
        as_polygon_list: bool,
    ) -> Option<CompositionOutcome> {
        let id = self.active?;
        let style = self.registry.active_element_style();
        let composer = ShapeComposer::new(
            &self.engine,
            self.config.flatten_tolerance_px,
            self.camera.units_per_pixel(),
        );
        let annotation = self.annotations.iter_mut().find(|a| a.id == id)?;
        annotation.displayed = true;

        let mut outcome = composer.compose(&mut annotation.elements, &style, &shapes, op, as_polygon_list);
        if !outcome.handled {
            for mut shape in shapes {
                shape.set_style(style.clone());
                outcome.added.push(shape.id);
                annotation.elements.add(shape);
            }
        }
        let changed = !(outcome.added.is_empty() && outcome.removed.is_empty());
        if changed {
            annotation.touch();
            self.mark_mutated(id);
        }
        if outcome.restart_draw_mode {
            self.session.restart();
        }
        Some(outcome)
    }

    /// Toggle a draw mode on the active annotation.
    pub fn toggle_draw_mode(&mut self, mode: DrawMode) -> Option<DrawMode> {
        self.active?;
        self.brush.cancel();
        self.session.toggle(mode)
    }

    /// Leave the draw mode, discarding anything in progress.
    pub fn cancel(&mut self) -> bool {
        self.brush.cancel();
        self.session.cancel()
    }

    /// Pointer pressed at a screen position.
    pub fn pointer_down(&mut self, screen: Point, modifier: Option<BooleanOp>) {
        let world = self.camera.screen_to_world(screen);
        match self.session.mode() {
            Some(DrawMode::Brush) => {
                let emission = self.brush.pointer_down(world, self.camera.units_per_pixel(), modifier);
                self.apply_brush(emission);
            }
            Some(_) => {
                if !self.session.is_drawing() {
                    self.session.choose_boolean_op(modifier);
                }
                self.session.begin(world);
            }
            None => {}
        }
    }

    /// Pointer moved to a screen position.
    pub fn pointer_move(&mut self, screen: Point) {
        let world = self.camera.screen_to_world(screen);
        if self.session.mode() == Some(DrawMode::Brush) {
            let upp = self.camera.units_per_pixel();
            if let Some(emission) = self.brush.pointer_move(&self.engine, world, upp) {
                self.apply_brush(emission);
            }
        } else {
            self.session.update(world);
        }
    }

    /// Pointer released at a screen position.
    pub fn pointer_up(&mut self, screen: Point) {
        match self.session.mode() {
            Some(DrawMode::Brush) => {
                self.brush.pointer_up();
            }
            Some(mode) if !mode.is_vertex_based() => {
                self.session.update(self.camera.screen_to_world(screen));
                self.finish_shape();
            }
            _ => {}
        }
    }

    /// Complete the shape in progress.
    pub fn finish_shape(&mut self) -> Option<CompositionOutcome> {
        let op = self.session.boolean_op();
        let element = self.session.finish()?;
        self.complete_shapes(vec![element], op, false)
    }

    fn apply_brush(&mut self, emission: BrushEmission) {
        let shapes = emission
            .shapes
            .into_iter()
            .map(|p| Element::from_polygon(p, Default::default()))
            .collect();
        self.complete_shapes(shapes, Some(emission.op), true);
    }

    // --- Camera ---

    pub fn pan(&mut self, delta: Vec2) {
        self.camera.pan(delta);
        self.brush.on_camera_changed(self.camera.units_per_pixel());
    }

    pub fn zoom_at(&mut self, screen: Point, factor: f64) {
        if self.camera.zoom_at(screen, factor) {
            self.brush.on_camera_changed(self.camera.units_per_pixel());
            for annotation in &self.annotations {
                self.redraws.request(annotation.id);
            }
        }
    }

    // --- Pixelmaps ---

    /// Paint the cell under a world point with the active group's category.
    ///
    /// The buffer changes immediately; the save is debounced.
    pub fn paint_pixelmap(
        &mut self,
        annotation: AnnotationId,
        element: ElementId,
        world: Point,
        now: Instant,
    ) -> bool {
        let group = self.registry.active().to_string();
        let Some(ann) = self.annotations.iter_mut().find(|a| a.id == annotation) else {
            return false;
        };
        let Some(pixelmap) = ann.elements.get_mut(element).and_then(Element::as_pixelmap_mut) else {
            return false;
        };
        let Some(index) = pixelmap.data_index_at(world) else {
            return false;
        };
        let category = pixelmap.category_index(&group);
        if !pixelmap.paint(index, category) {
            return false;
        }
        ann.touch();
        self.debouncer.mark(annotation, now);
        self.redraws.request(annotation);
        true
    }

    // --- Style groups ---

    /// Add or update a style group and re-reconcile every pixelmap.
    ///
    /// Invalid groups are rejected before anything changes.
    pub fn upsert_style_group(&mut self, group: StyleGroup) -> Result<(), StyleError> {
        group.validate()?;
        let write = if self.registry.contains(&group.id) {
            StyleWrite::Save(group.clone())
        } else {
            StyleWrite::Add(group.clone())
        };
        self.registry.upsert(group);
        self.style_writes.push(write);
        self.reconcile_all();
        Ok(())
    }

    /// Delete a style group. The default group comes back with stock colors.
    pub fn remove_style_group(&mut self, id: &str) -> Option<StyleGroup> {
        let removed = self.registry.remove(id)?;
        self.style_writes.push(StyleWrite::Destroy(removed.id.clone()));
        if removed.id == self.registry.default_name() {
            if let Some(default) = self.registry.default_group() {
                self.style_writes.push(StyleWrite::Add(default.clone()));
            }
        }
        self.reconcile_all();
        Some(removed)
    }

    pub fn set_active_group(&mut self, id: &str) -> Result<(), StyleError> {
        self.registry.set_active(id)
    }

    pub fn next_style_group(&mut self) -> Option<String> {
        self.registry.next_group().map(|g| g.id.clone())
    }

    pub fn prev_style_group(&mut self) -> Option<String> {
        self.registry.prev_group().map(|g| g.id.clone())
    }

    /// Style registry writes not yet sent to the store.
    pub fn pending_style_writes(&self) -> &[StyleWrite] {
        &self.style_writes
    }

    /// Reconcile every pixelmap of every annotation with the registry.
    pub fn reconcile_all(&mut self) {
        let ids: Vec<AnnotationId> = self.annotations.iter().map(|a| a.id).collect();
        for id in ids {
            self.reconcile_annotation(id);
        }
    }

    fn reconcile_annotation(&mut self, id: AnnotationId) {
        let Some(annotation) = self.annotations.iter_mut().find(|a| a.id == id) else {
            return;
        };
        let mut changed = false;
        for element_id in annotation.elements.pixelmap_ids() {
            let Some(pixelmap) = annotation
                .elements
                .get_mut(element_id)
                .and_then(Element::as_pixelmap_mut)
            else {
                continue;
            };
            let outcome = reconcile_pixelmap(pixelmap, &mut self.registry);
            changed |= outcome.changed;
            self.style_writes
                .extend(outcome.new_groups.into_iter().map(StyleWrite::Add));
        }
        if changed {
            annotation.touch();
            self.mark_mutated(id);
        }
    }

    // --- Keyboard ---

    /// Handle a key press. Returns the action that was performed.
    pub fn handle_key(&mut self, key: &str) -> Option<EditorAction> {
        let action = action_for_key(key)?;
        let has_active = self.active.is_some();
        match action {
            EditorAction::Draw(mode) if has_active => {
                self.toggle_draw_mode(mode);
            }
            EditorAction::NextBrushShape if has_active => {
                self.brush.next_brush_shape();
            }
            EditorAction::AdjustBrushSize(delta) if has_active => {
                self.brush
                    .adjust_brush_size(f64::from(delta), self.camera.units_per_pixel());
            }
            EditorAction::PrevStyleGroup if has_active => {
                self.prev_style_group();
            }
            EditorAction::NextStyleGroup if has_active => {
                self.next_style_group();
            }
            EditorAction::FinishShape if has_active => {
                if self.session.mode().is_some_and(DrawMode::is_vertex_based) {
                    let restart = self.finish_shape().is_some_and(|o| o.restart_draw_mode);
                    if !restart {
                        self.cancel();
                    }
                }
            }
            EditorAction::ToggleAnnotations => {
                self.toggle_annotations();
            }
            EditorAction::NewAnnotation => {
                let name = format!("Annotation {}", self.annotations.len() + 1);
                self.create_annotation(name);
            }
            EditorAction::Cancel => {
                self.cancel();
            }
            _ => return None,
        }
        Some(action)
    }

    // --- Timers and persistence ---

    /// Advance timers: release debounced pixelmap edits and due retries.
    pub fn tick(&mut self, now: Instant) {
        for id in self.debouncer.take_due(now) {
            self.scheduler.notify_mutated(id);
        }
        self.scheduler.tick(now);
    }

    /// Earliest time [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.debouncer.next_deadline(), self.scheduler.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Hand every pending pixelmap edit to the saver now.
    pub fn flush(&mut self) {
        for id in self.debouncer.flush_all() {
            self.scheduler.notify_mutated(id);
        }
    }

    /// Ask to re-fetch every persisted annotation.
    ///
    /// Deferred while anything is saving; returns false in that case and the
    /// fetches are handed out once saving settles. Otherwise the fetch jobs
    /// are queued for [`take_save_jobs`](Self::take_save_jobs).
    pub fn request_refresh(&mut self) -> bool {
        if !self.scheduler.request_refresh() {
            log::debug!("Deferring refresh until saves finish");
            return false;
        }
        self.queue_fetches();
        true
    }

    fn queue_fetches(&mut self) {
        let ids: Vec<AnnotationId> = self
            .annotations
            .iter()
            .filter(|a| a.is_persisted())
            .map(|a| a.id)
            .collect();
        for id in ids {
            if !self.pending_fetches.contains(&id) {
                self.scheduler.begin_fetch(id);
                self.pending_fetches.push(id);
            }
        }
    }

    /// Remote work that is ready to run.
    ///
    /// Jobs own everything they need, so the caller can run them with
    /// [`SaveJob::run`] while the editor keeps handling input, and report each
    /// result back through [`complete_save`](Self::complete_save).
    pub fn take_save_jobs(&mut self, now: Instant) -> Vec<SaveJob> {
        let mut jobs = Vec::new();
        loop {
            let requests = self.scheduler.poll_requests();
            if requests.is_empty() {
                break;
            }
            for request in requests {
                match request {
                    SaveRequest::Write(id) => {
                        let snapshot = self.annotation(id).cloned();
                        match snapshot {
                            Some(annotation) => jobs.push(SaveJob::Write(annotation)),
                            None => {
                                log::debug!("Skipping write of removed annotation {}", id);
                                self.scheduler.complete(id, &Ok(()), now);
                            }
                        }
                    }
                    SaveRequest::Delete(id) => jobs.push(SaveJob::Delete(id)),
                    SaveRequest::Refresh => self.queue_fetches(),
                }
            }
        }
        jobs.extend(self.pending_fetches.drain(..).map(SaveJob::Fetch));
        jobs
    }

    /// Apply the result of a job handed out by [`take_save_jobs`](Self::take_save_jobs).
    pub fn complete_save(&mut self, outcome: SaveOutcome, now: Instant) {
        match outcome {
            SaveOutcome::Written { id, version, result } => {
                if result.is_ok() {
                    if let Some(annotation) = self.annotation_mut(id) {
                        annotation.mark_saved(version);
                    }
                }
                self.scheduler.complete(id, &result, now);
            }
            SaveOutcome::Deleted { id, result } => {
                let result = match result {
                    Err(StoreError::NotFound(_)) => Ok(()),
                    other => other,
                };
                self.scheduler.complete(id, &result, now);
            }
            SaveOutcome::Fetched { id, result } => {
                self.scheduler.end_fetch(id);
                self.apply_fetched(id, result);
            }
        }
    }

    fn apply_fetched(&mut self, id: AnnotationId, result: StoreResult<Annotation>) {
        match result {
            Ok(remote) => {
                let Some(local) = self.annotation_mut(id) else {
                    return;
                };
                if remote.version != local.version && local.accept_refresh(remote) {
                    log::debug!("Refreshed annotation {}", id);
                    self.reconcile_annotation(id);
                    self.redraws.request(id);
                } else if local.is_modified() {
                    // Edits made while fetching were held back
                    self.scheduler.notify_mutated(id);
                }
            }
            Err(StoreError::NotFound(_)) => {
                log::info!("Annotation {} was removed remotely", id);
                self.annotations.retain(|a| a.id != id);
                self.debouncer.discard(id);
                self.scheduler.forget(id);
                if self.active == Some(id) {
                    self.active = None;
                    self.cancel();
                }
            }
            Err(err) => {
                log::error!("Refreshing annotation {} failed: {}", id, err);
                if self.annotation(id).is_some_and(Annotation::is_modified) {
                    self.scheduler.notify_mutated(id);
                }
            }
        }
    }

    /// Run every queued job to completion, including follow-ups.
    ///
    /// The editor stays borrowed until all work is done. Interactive shells
    /// use [`take_save_jobs`](Self::take_save_jobs) and
    /// [`complete_save`](Self::complete_save) instead. Returns the number of
    /// store operations performed.
    pub async fn process_saves<S: AnnotationStore + ?Sized>(&mut self, store: &S, now: Instant) -> usize {
        let mut operations = 0;
        loop {
            let jobs = self.take_save_jobs(now);
            if jobs.is_empty() {
                return operations;
            }
            for job in jobs {
                operations += 1;
                let outcome = job.run(store).await;
                self.complete_save(outcome, now);
            }
        }
    }

    /// Send pending style registry changes to the style store.
    ///
    /// Stops at the first failure; unsent changes stay queued.
    pub async fn persist_style_groups<S: StyleStore + ?Sized>(&mut self, store: &S) -> StoreResult<usize> {
        let mut sent = 0;
        while let Some(write) = self.style_writes.first().cloned() {
            let result = match &write {
                StyleWrite::Add(group) => store.add(&self.user, group).await,
                StyleWrite::Save(group) => store.save(&self.user, group).await,
                StyleWrite::Destroy(id) => store.destroy(&self.user, id).await,
            };
            if let Err(err) = result {
                log::error!("Saving style group change {:?} failed: {}", write, err);
                return Err(err);
            }
            self.style_writes.remove(0);
            sent += 1;
        }
        Ok(sent)
    }
}
