//! Bounding volume hierarchy over borrowed scene objects.
//!
//! Nodes live in one flat array. Node 0 is the root, and an internal node
//! stores the index of its left child; the right child always sits directly
//! after it. Leaves address a contiguous range of the reordered object list.

use std::f32;
use std::time::Instant;

use log::{debug, info, trace};
use smallvec::SmallVec;

use super::aabb::Aabb;
use super::shapes::*;

/// Outward padding of the root box only, so rays grazing the scene bounds
/// still enter the tree. Inner boxes stay tight.
pub const ROOT_EPSILON: f32 = 1e-4;

pub const DEFAULT_LEAF_THRESHOLD: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeKind {
    Leaf { first: usize, count: usize },
    Internal { left: usize },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BvhNode {
    pub bbox: Aabb,
    pub kind: NodeKind,
}

impl BvhNode {
    fn leaf(bbox: Aabb, first: usize, count: usize) -> Self {
        BvhNode { bbox, kind: NodeKind::Leaf { first, count } }
    }

    pub fn is_leaf(&self) -> bool {
        match self.kind {
            NodeKind::Leaf { .. } => true,
            NodeKind::Internal { .. } => false,
        }
    }

    /// `(left, right)` child indices of an internal node.
    pub fn children(&self) -> Option<(usize, usize)> {
        match self.kind {
            NodeKind::Internal { left } => Some((left, left + 1)),
            NodeKind::Leaf { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BvhStats {
    pub nodes: usize,
    pub leaves: usize,
    pub max_depth: usize,
    pub max_leaf_size: usize,
}

/// Surface-area summary of a built tree, in world units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BvhAreas {
    pub root: f32,
    pub internal: f32,
    pub leaves: f32,
}

/// Result of a nearest-hit query.
pub struct Hit<'a, O: ?Sized> {
    pub object: &'a O,
    pub distance: f32,
    pub point: Point3f,
}

impl<'a, O: ?Sized> Clone for Hit<'a, O> {
    fn clone(&self) -> Self {
        Hit { object: self.object, distance: self.distance, point: self.point }
    }
}

impl<'a, O: ?Sized> Copy for Hit<'a, O> {}

struct BuildEntry<'a, O: ?Sized> {
    object: &'a O,
    bbox: Aabb,
    centroid: Point3f,
}

#[derive(Clone, Copy)]
struct StackItem {
    node: usize,
    t: f32,
}

/// Deferred children of one query. Lives on the call stack until the tree is
/// deeper than its inline capacity.
type TraversalStack = SmallVec<[StackItem; 64]>;

pub struct Bvh<'a, O: ?Sized> {
    nodes: Vec<BvhNode>,
    objects: Vec<&'a O>,
    leaf_threshold: usize,
}

impl<'a, O: Object + ?Sized> Bvh<'a, O> {
    /// Builds the tree once. The objects must outlive the returned value;
    /// the tree only keeps references to them, in its own order.
    pub fn build<I>(objects: I, leaf_threshold: usize) -> Self
    where
        I: IntoIterator<Item = &'a O>,
    {
        let start = Instant::now();
        let leaf_threshold = leaf_threshold.max(1);

        let mut world_bbox = Aabb::empty();
        let mut entries: Vec<BuildEntry<'a, O>> = objects
            .into_iter()
            .map(|object| {
                let bbox = object.bounding_box();
                world_bbox.extend(&bbox);
                BuildEntry { object, bbox, centroid: object.centroid() }
            })
            .collect();

        let root = BvhNode::leaf(world_bbox.expanded(ROOT_EPSILON), 0, entries.len());
        let mut nodes = vec![root];
        if entries.is_empty() {
            debug!("building BVH over an empty object set");
        } else {
            build_nodes(&mut nodes, &mut entries, leaf_threshold);
        }

        let bvh = Bvh {
            nodes,
            objects: entries.into_iter().map(|e| e.object).collect(),
            leaf_threshold,
        };
        let stats = bvh.stats();
        info!(
            "BVH built: {} objects, {} nodes, {} leaves, depth {} in {:.2?}",
            bvh.num_objects(),
            stats.nodes,
            stats.leaves,
            stats.max_depth,
            start.elapsed()
        );
        debug!("{:?}", bvh.areas());
        bvh
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn leaf_threshold(&self) -> usize {
        self.leaf_threshold
    }

    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Objects in tree order; leaf ranges index into this slice.
    pub fn objects(&self) -> &[&'a O] {
        &self.objects
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes[0].bbox
    }

    pub fn stats(&self) -> BvhStats {
        let mut stats = BvhStats { nodes: self.nodes.len(), ..BvhStats::default() };
        let mut pending = vec![(0usize, 0usize)];
        while let Some((index, depth)) = pending.pop() {
            stats.max_depth = stats.max_depth.max(depth);
            match self.nodes[index].kind {
                NodeKind::Leaf { count, .. } => {
                    stats.leaves += 1;
                    stats.max_leaf_size = stats.max_leaf_size.max(count);
                }
                NodeKind::Internal { left } => {
                    pending.push((left, depth + 1));
                    pending.push((left + 1, depth + 1));
                }
            }
        }
        stats
    }

    /// Summed box areas of internal nodes and of leaves, next to the root's.
    /// The ratios to `root` estimate how many boxes a random ray visits.
    pub fn areas(&self) -> BvhAreas {
        self.nodes.iter().fold(
            BvhAreas { root: self.bounds().surface_area(), ..BvhAreas::default() },
            |mut areas, node| {
                if node.is_leaf() {
                    areas.leaves += node.bbox.surface_area();
                } else {
                    areas.internal += node.bbox.surface_area();
                }
                areas
            },
        )
    }

    fn leaf_objects(&self, first: usize, count: usize) -> &[&'a O] {
        &self.objects[first..first + count]
    }

    /// Picks the nearer of the children at `left` and `left + 1`.
    /// The farther child, if also hit before `limit`, goes on the stack.
    fn descend(&self, ray: &Ray, left: usize, limit: f32, stack: &mut TraversalStack) -> Option<usize> {
        let right = left + 1;
        let hit = |index: usize| {
            self.nodes[index].bbox.intersect(ray).filter(|&t| t < limit)
        };
        match (hit(left), hit(right)) {
            (Some(tl), Some(tr)) => {
                if tl <= tr {
                    stack.push(StackItem { node: right, t: tr });
                    Some(left)
                } else {
                    stack.push(StackItem { node: left, t: tl });
                    Some(right)
                }
            }
            (Some(_), None) => Some(left),
            (None, Some(_)) => Some(right),
            (None, None) => None,
        }
    }

    /// Nearest intersection along the ray, if any.
    pub fn closest_hit(&self, ray: &Ray) -> Option<Hit<'a, O>> {
        if self.objects.is_empty() || self.nodes[0].bbox.intersect(ray).is_none() {
            return None;
        }

        let mut stack = TraversalStack::new();
        let mut closest_t = f32::INFINITY;
        let mut closest: Option<&'a O> = None;
        let mut current = Some(0);

        loop {
            if let Some(index) = current {
                current = match self.nodes[index].kind {
                    NodeKind::Internal { left } => self.descend(ray, left, closest_t, &mut stack),
                    NodeKind::Leaf { first, count } => {
                        for &object in self.leaf_objects(first, count) {
                            if let Some(t) = object.intersect(ray) {
                                if t < closest_t {
                                    closest_t = t;
                                    closest = Some(object);
                                }
                            }
                        }
                        None
                    }
                };
                if current.is_some() {
                    continue;
                }
            }

            match pop_closer(&mut stack, closest_t) {
                Some(index) => current = Some(index),
                None => break,
            }
        }

        closest.map(|object| Hit { object, distance: closest_t, point: ray.at(closest_t) })
    }

    /// True if anything intersects the ray closer than `max_distance`.
    pub fn occluded(&self, ray: &Ray, max_distance: f32) -> bool {
        if self.objects.is_empty() {
            return false;
        }
        match self.nodes[0].bbox.intersect(ray) {
            Some(t) if t < max_distance => {}
            _ => return false,
        }

        let mut stack = TraversalStack::new();
        let mut current = Some(0);

        loop {
            if let Some(index) = current {
                current = match self.nodes[index].kind {
                    NodeKind::Internal { left } => self.descend(ray, left, max_distance, &mut stack),
                    NodeKind::Leaf { first, count } => {
                        let blocked = self
                            .leaf_objects(first, count)
                            .iter()
                            .any(|object| object.intersect(ray).map_or(false, |t| t < max_distance));
                        if blocked {
                            return true;
                        }
                        None
                    }
                };
                if current.is_some() {
                    continue;
                }
            }

            match pop_closer(&mut stack, max_distance) {
                Some(index) => current = Some(index),
                None => return false,
            }
        }
    }

    /// Shadow query for the open segment between two points.
    pub fn occluded_between(&self, from: Point3f, to: Point3f) -> bool {
        let (ray, distance) = Ray::between(from, to);
        self.occluded(&ray, distance)
    }
}

/// Pops until an entry that could still beat `limit` turns up.
fn pop_closer(stack: &mut TraversalStack, limit: f32) -> Option<usize> {
    while let Some(item) = stack.pop() {
        if item.t < limit {
            return Some(item.node);
        }
        trace!("pruned node {} at t={} (limit {})", item.node, item.t, limit);
    }
    None
}

fn union_of<O: ?Sized>(entries: &[BuildEntry<'_, O>]) -> Aabb {
    entries.iter().fold(Aabb::empty(), |acc, e| acc.union(&e.bbox))
}

/// A sorted range whose split at `mid` would leave one side without objects.
fn one_side_empty<O: ?Sized>(range: &[BuildEntry<'_, O>], axis: usize, mid: f32) -> bool {
    range[0].centroid[axis] > mid || range[range.len() - 1].centroid[axis] <= mid
}

/// Splits the root leaf until every leaf holds at most `threshold` objects.
/// Both children of a node are appended together, and pending ranges sit on
/// an explicit work list, left range on top.
fn build_nodes<O: ?Sized>(nodes: &mut Vec<BvhNode>, entries: &mut [BuildEntry<'_, O>], threshold: usize) {
    let mut work = vec![(0usize, 0usize, entries.len())];

    while let Some((node, left_index, right_index)) = work.pop() {
        let num_objs = right_index - left_index;
        let bbox = nodes[node].bbox;

        if num_objs <= threshold {
            nodes[node] = BvhNode::leaf(bbox, left_index, num_objs);
            continue;
        }

        let axis = bbox.max_extent_axis();
        entries[left_index..right_index].sort_by(|a, b| a.centroid[axis].total_cmp(&b.centroid[axis]));
        let range = &entries[left_index..right_index];

        let mut mid = (bbox.min[axis] + bbox.max[axis]) * 0.5;
        if one_side_empty(range, axis, mid) {
            mid = range.iter().map(|e| e.centroid[axis]).sum::<f32>() / num_objs as f32;
            trace!("node {}: spatial midpoint degenerate, using centroid mean {}", node, mid);
        }

        let split = if one_side_empty(range, axis, mid) {
            trace!("node {}: centroid mean degenerate, splitting by count", node);
            threshold
        } else {
            range.iter().position(|e| e.centroid[axis] > mid).unwrap_or(range.len())
        };
        let split_index = left_index + split;

        let left_box = union_of(&range[..split]);
        let right_box = union_of(&range[split..]);

        let left = nodes.len();
        nodes[node] = BvhNode { bbox, kind: NodeKind::Internal { left } };
        nodes.push(BvhNode::leaf(left_box, left_index, split));
        nodes.push(BvhNode::leaf(right_box, split_index, right_index - split_index));

        work.push((left + 1, split_index, right_index));
        work.push((left, left_index, split_index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sphere(x: f32, y: f32, z: f32) -> Sphere {
        Sphere::new(Point3f::new(x, y, z), 1.0, 0)
    }

    fn row_of_spheres(n: usize) -> Vec<Sphere> {
        (0..n).map(|i| sphere(i as f32 * 3.0, 0.0, 0.0)).collect()
    }

    fn check_structure(bvh: &Bvh<Sphere>) {
        let mut seen = vec![0usize; bvh.num_objects()];
        for node in bvh.nodes() {
            match node.kind {
                NodeKind::Leaf { first, count } => {
                    assert!(count <= bvh.leaf_threshold());
                    for i in first..first + count {
                        seen[i] += 1;
                        assert!(node.bbox.contains(&bvh.objects()[i].bounding_box()));
                    }
                }
                NodeKind::Internal { left } => {
                    let (l, r) = node.children().unwrap();
                    assert_eq!(l, left);
                    assert_eq!(r, l + 1);
                    assert!(node.bbox.contains(&bvh.nodes()[l].bbox));
                    assert!(node.bbox.contains(&bvh.nodes()[r].bbox));
                }
            }
        }
        assert!(seen.iter().all(|&c| c == 1), "leaf ranges must cover each object once");
    }

    #[test]
    fn empty_build_is_a_single_empty_leaf() {
        let objects: Vec<Sphere> = vec![];
        let bvh = Bvh::build(&objects, 2);
        assert_eq!(bvh.num_objects(), 0);
        assert_eq!(bvh.nodes().len(), 1);
        assert_eq!(bvh.nodes()[0].kind, NodeKind::Leaf { first: 0, count: 0 });
        let ray = Ray::new(Point3f::new(0.0, 0.0, -10.0), Vector3f::new(0.0, 0.0, 1.0));
        assert!(bvh.closest_hit(&ray).is_none());
        assert!(!bvh.occluded(&ray, f32::INFINITY));
    }

    #[test]
    fn single_object_is_one_leaf() {
        let objects = vec![sphere(0.0, 0.0, 0.0)];
        let bvh = Bvh::build(&objects, 2);
        assert_eq!(bvh.nodes().len(), 1);
        assert_eq!(bvh.nodes()[0].kind, NodeKind::Leaf { first: 0, count: 1 });
    }

    #[test]
    fn root_box_is_expanded_by_epsilon() {
        let objects = vec![sphere(0.0, 0.0, 0.0), sphere(4.0, 0.0, 0.0), sphere(8.0, 0.0, 0.0)];
        let bvh = Bvh::build(&objects, 1);
        let root = bvh.bounds();
        assert_relative_eq!(root.min.x, -1.0 - ROOT_EPSILON);
        assert_relative_eq!(root.max.z, 1.0 + ROOT_EPSILON);
        let (l, _) = bvh.nodes()[0].children().unwrap();
        assert_relative_eq!(bvh.nodes()[l].bbox.min.x, -1.0);
    }

    #[test]
    fn structure_invariants_hold() {
        for threshold in 1..5 {
            let objects = row_of_spheres(37);
            let bvh = Bvh::build(&objects, threshold);
            check_structure(&bvh);
        }
    }

    #[test]
    fn coincident_centroids_fall_back_to_count_split() {
        let objects: Vec<Sphere> = (0..9).map(|_| sphere(1.0, 1.0, 1.0)).collect();
        let bvh = Bvh::build(&objects, 2);
        check_structure(&bvh);
        let (l, _) = bvh.nodes()[0].children().unwrap();
        assert_eq!(bvh.nodes()[l].kind, NodeKind::Leaf { first: 0, count: 2 });
    }

    #[test]
    fn many_coincident_objects_build_without_recursion() {
        let objects: Vec<Sphere> = (0..30_000).map(|_| sphere(1.0, 1.0, 1.0)).collect();
        let bvh = Bvh::build(&objects, 1);
        assert_eq!(bvh.num_objects(), 30_000);
        check_structure(&bvh);
        assert_eq!(bvh.stats().max_depth, 29_999);

        let ray = Ray::new(Point3f::new(1.0, 1.0, -10.0), Vector3f::new(0.0, 0.0, 1.0));
        assert_relative_eq!(bvh.closest_hit(&ray).unwrap().distance, 10.0);
        assert!(bvh.occluded(&ray, 20.0));
    }

    #[test]
    fn degenerate_midpoint_falls_back_to_centroid_mean() {
        let objects = vec![
            Sphere::new(Point3f::new(0.0, 0.0, 0.0), 0.5, 0),
            Sphere::new(Point3f::new(1.0, 0.0, 0.0), 0.5, 0),
            Sphere::new(Point3f::new(2.0, 0.0, 0.0), 100.0, 0),
        ];
        let bvh = Bvh::build(&objects, 1);
        let kinds: Vec<NodeKind> = bvh.nodes().iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Internal { left: 1 },
                NodeKind::Internal { left: 3 },
                NodeKind::Leaf { first: 2, count: 1 },
                NodeKind::Leaf { first: 0, count: 1 },
                NodeKind::Leaf { first: 1, count: 1 },
            ]
        );
        assert_relative_eq!(bvh.objects()[2].radius, 100.0);
        check_structure(&bvh);
    }

    #[test]
    fn structure_invariants_hold_in_random_scene() {
        let mut rng = StdRng::seed_from_u64(7);
        let objects: Vec<Sphere> = (0..500)
            .map(|_| {
                let origin = Point3f::new(
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-30.0..30.0),
                );
                Sphere::new(origin, rng.gen_range(0.1..3.0), 0)
            })
            .collect();
        for threshold in 1..6 {
            let bvh = Bvh::build(&objects, threshold);
            check_structure(&bvh);
            assert!(bvh.stats().max_leaf_size <= threshold);
        }
    }

    #[test]
    fn areas_sum_node_boxes() {
        let objects = vec![sphere(0.0, 0.0, 0.0), sphere(4.0, 0.0, 0.0)];
        let bvh = Bvh::build(&objects, 1);
        let areas = bvh.areas();
        assert_relative_eq!(areas.root, bvh.bounds().surface_area());
        assert_relative_eq!(areas.internal, areas.root);
        // two unit spheres, 24 each
        assert_relative_eq!(areas.leaves, 48.0);

        let empty: Vec<Sphere> = vec![];
        assert_eq!(Bvh::build(&empty, 1).areas(), BvhAreas::default());
    }

    #[test]
    fn traversal_stack_spills_past_inline_capacity() {
        let mut stack = TraversalStack::new();
        for node in 0..200 {
            stack.push(StackItem { node, t: node as f32 });
        }
        assert!(stack.spilled());
        // entries at or beyond the limit are discarded on the way down
        assert_eq!(pop_closer(&mut stack, 150.0), Some(149));
        assert_eq!(stack.len(), 149);
        assert_eq!(pop_closer(&mut stack, f32::INFINITY), Some(148));
        assert_eq!(pop_closer(&mut stack, -1.0), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn zero_threshold_is_treated_as_one() {
        let objects = row_of_spheres(4);
        let bvh = Bvh::build(&objects, 0);
        assert_eq!(bvh.leaf_threshold(), 1);
        check_structure(&bvh);
    }

    #[test]
    fn nearest_hit_picks_front_object() {
        let objects = vec![sphere(0.0, 0.0, 10.0), sphere(0.0, 0.0, 5.0), sphere(0.0, 0.0, 20.0)];
        let bvh = Bvh::build(&objects, 1);
        let ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vector3f::new(0.0, 0.0, 1.0));
        let hit = bvh.closest_hit(&ray).unwrap();
        assert_relative_eq!(hit.distance, 4.0);
        assert_relative_eq!(hit.object.origin, Point3f::new(0.0, 0.0, 5.0));
        assert_relative_eq!(hit.point, Point3f::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn traversal_is_repeatable() {
        let objects = row_of_spheres(16);
        let bvh = Bvh::build(&objects, 2);
        let ray = Ray::new(Point3f::new(21.0, 0.2, -10.0), Vector3f::new(0.0, 0.0, 1.0));
        let first = bvh.closest_hit(&ray).map(|h| (h.distance, h.object.origin));
        for _ in 0..5 {
            let again = bvh.closest_hit(&ray).map(|h| (h.distance, h.object.origin));
            assert_eq!(first, again);
        }
        assert!(first.is_some());
    }

    #[test]
    fn occlusion_respects_max_distance() {
        let objects = row_of_spheres(8);
        let bvh = Bvh::build(&objects, 2);
        // sphere at x=9 is hit at t=9 from z=-10
        let ray = Ray::new(Point3f::new(9.0, 0.0, -10.0), Vector3f::new(0.0, 0.0, 1.0));
        assert!(bvh.occluded(&ray, 9.0 + 1e-3));
        assert!(!bvh.occluded(&ray, 9.0 - 1e-3));
        assert!(!bvh.occluded(&ray, 9.0));
    }

    #[test]
    fn occluded_between_points() {
        let objects = vec![sphere(0.0, 0.0, 0.0)];
        let bvh = Bvh::build(&objects, 2);
        let from = Point3f::new(0.0, 0.0, -5.0);
        assert!(bvh.occluded_between(from, Point3f::new(0.0, 0.0, 5.0)));
        assert!(!bvh.occluded_between(from, Point3f::new(0.0, 0.0, -2.0)));
    }

    #[test]
    fn stats_count_nodes_and_leaves() {
        let objects = row_of_spheres(8);
        let bvh = Bvh::build(&objects, 2);
        let stats = bvh.stats();
        assert_eq!(stats.nodes, bvh.nodes().len());
        assert_eq!(stats.leaves * 2 - 1, stats.nodes);
        assert!(stats.max_leaf_size <= 2);
        assert!(stats.max_depth >= 2);
    }

    #[test]
    fn degenerate_ray_does_not_panic() {
        let objects = row_of_spheres(8);
        let bvh = Bvh::build(&objects, 2);
        let ray = Ray::new(Point3f::new(0.0, 0.0, -10.0), Vector3f::new(0.0, 0.0, 0.0));
        let _ = bvh.closest_hit(&ray);
        let _ = bvh.occluded(&ray, 100.0);
    }
}
