//! Ordered collection of warped maps with z-order, visibility, and an
//! R-tree spatial index over projected-geo bboxes.
//!
//! `WarpedMapList` is the single owner of every [`WarpedMap`]; maps never
//! hold a back-reference to the list or the cache, breaking the would-be
//! WarpedMap↔WarpedMapList↔Cache reference cycle with a stable integer
//! [`MapId`] instead.

use std::collections::HashMap;

use rstar::{RTree, RTreeObject, AABB};

use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::geometry::{self, Bbox, Point, Ring};
use crate::warped_map::{MapId, WarpedMap};

#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedBbox {
    map_id: MapId,
    bbox: Bbox,
}

impl RTreeObject for IndexedBbox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.bbox.min.x, self.bbox.min.y], [self.bbox.max.x, self.bbox.max.y])
    }
}

/// Z-order operation accepted by [`WarpedMapList::set_z_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZOrderOp {
    ToFront,
    ToBack,
    Forward,
    Backward,
}

pub struct WarpedMapList {
    maps: HashMap<MapId, WarpedMap>,
    /// Back-to-front draw order; a permutation of `maps.keys()`.
    z_order: Vec<MapId>,
    visible: HashMap<MapId, bool>,
    index: RTree<IndexedBbox>,
    events: EventBus,
}

impl Default for WarpedMapList {
    fn default() -> Self {
        Self::new()
    }
}

impl WarpedMapList {
    pub fn new() -> Self {
        Self {
            maps: HashMap::new(),
            z_order: Vec::new(),
            visible: HashMap::new(),
            index: RTree::new(),
            events: EventBus::new(),
        }
    }

    pub fn events(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Inserts `map`, rejecting a `mapId` already present — `mapId` is the
    /// primary key, so re-adding one silently replacing the existing map is
    /// not an option.
    pub fn add(&mut self, map: WarpedMap) -> Result<MapId> {
        let map_id = map.map_id();
        if self.maps.contains_key(&map_id) {
            return Err(Error::DuplicateMapId(map_id));
        }
        self.index.insert(IndexedBbox { map_id, bbox: map.bbox() });
        self.maps.insert(map_id, map);
        self.z_order.push(map_id);
        self.visible.insert(map_id, true);
        self.events.publish(Event::WarpedMapAdded { map_id });
        Ok(map_id)
    }

    pub fn remove(&mut self, map_id: MapId) -> Option<WarpedMap> {
        let mut map = self.maps.remove(&map_id)?;
        map.mark_removed();
        self.z_order.retain(|id| *id != map_id);
        self.visible.remove(&map_id);
        self.index.remove(&IndexedBbox { map_id, bbox: map.bbox() });
        self.events.publish(Event::WarpedMapRemoved { map_id });
        Some(map)
    }

    pub fn get(&self, map_id: MapId) -> Option<&WarpedMap> {
        self.maps.get(&map_id)
    }

    pub fn get_mut(&mut self, map_id: MapId) -> Option<&mut WarpedMap> {
        self.maps.get_mut(&map_id)
    }

    /// Re-indexes `map_id`'s bbox; callers must call this after a setter on
    /// the underlying [`WarpedMap`] changes its projected-geo geometry.
    pub fn reindex(&mut self, map_id: MapId) {
        let Some(map) = self.maps.get(&map_id) else { return };
        let new_bbox = map.bbox();
        let stale: Vec<IndexedBbox> =
        self.index.iter().filter(|e| e.map_id == map_id).copied().collect();
        for entry in stale {
            self.index.remove(&entry);
        }
        self.index.insert(IndexedBbox { map_id, bbox: new_bbox });
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn z_order(&self) -> &[MapId] {
        &self.z_order
    }

    pub fn is_visible(&self, map_id: MapId) -> bool {
        self.visible.get(&map_id).copied().unwrap_or(false)
    }

    pub fn show(&mut self, map_id: MapId) {
        self.visible.insert(map_id, true);
    }

    pub fn hide(&mut self, map_id: MapId) {
        self.visible.insert(map_id, false);
    }

    /// Permutes `z_order`; `map_id` not present is a no-op. `ToFront`/`ToBack`
    /// are fixed points of themselves.
    pub fn set_z_order(&mut self, map_id: MapId, op: ZOrderOp) {
        let Some(pos) = self.z_order.iter().position(|id| *id == map_id) else { return };
        match op {
            ZOrderOp::ToFront => {
                let id = self.z_order.remove(pos);
                self.z_order.push(id);
            }
            ZOrderOp::ToBack => {
                let id = self.z_order.remove(pos);
                self.z_order.insert(0, id);
            }
            ZOrderOp::Forward => {
                if pos + 1 < self.z_order.len() {
                    self.z_order.swap(pos, pos + 1);
                }
            }
            ZOrderOp::Backward => {
                if pos > 0 {
                    self.z_order.swap(pos, pos - 1);
                }
            }
        }
    }

    /// Union bbox over `map_ids`, or every map if `map_ids` is empty.
    pub fn bbox(&self, map_ids: &[MapId]) -> Option<Bbox> {
        let ids = self.resolve_ids(map_ids);
        ids.into_iter()
            .filter_map(|id| self.maps.get(&id))
            .map(|m| m.bbox())
            .reduce(|a, b| a.union(&b))
    }

    /// Convex hull of the projected-geo points of `map_ids` (every map if
    /// empty).
    pub fn convex_hull(&self, map_ids: &[MapId]) -> Ring {
        let ids = self.resolve_ids(map_ids);
        let points: Vec<Point> = ids
            .into_iter()
            .filter_map(|id| self.maps.get(&id))
            .flat_map(|m| m.convex_hull().clone())
            .collect();
        geometry::convex_hull(&points)
    }

    /// Visible maps whose bbox overlaps `bbox`, via the R-tree.
    pub fn maps_intersecting(&self, bbox: Bbox) -> Vec<MapId> {
        let aabb = AABB::from_corners([bbox.min.x, bbox.min.y], [bbox.max.x, bbox.max.y]);
        self.index
            .locate_in_envelope_intersecting(&aabb)
            .map(|e| e.map_id)
            .filter(|id| self.is_visible(*id))
            .collect()
    }

    fn resolve_ids(&self, map_ids: &[MapId]) -> Vec<MapId> {
        if map_ids.is_empty() {
            self.maps.keys().copied().collect()
        } else {
            map_ids.to_vec()
        }
    }
}
