use bevy::math::DVec2;
use bevy::prelude::*;

use crate::components::Body;
use crate::physics::{advance_body, softened_acceleration, softening_length};

/// Subdivision stops here; deeper collisions share a bucket leaf.
pub const MAX_TREE_DEPTH: u32 = 32;

/// Axis-aligned region `[min.x, max.x] × [min.y, max.y]`, edges inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub min: DVec2,
    pub max: DVec2,
}

impl Region {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min: DVec2::new(x0, y0),
            max: DVec2::new(x1, y1),
        }
    }

    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn midpoint(&self) -> DVec2 {
        (self.min + self.max) / 2.0
    }

    /// NaN coordinates are never contained.
    pub fn contains(&self, point: DVec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// False once the midpoint collapses onto an edge in floating point.
    pub fn can_subdivide(&self) -> bool {
        let mid = self.midpoint();
        self.min.x < mid.x && mid.x < self.max.x && self.min.y < mid.y && mid.y < self.max.y
    }

    /// Quadrant for a point already known to be inside the region.
    ///
    /// The midpoint belongs to the lower quadrants: top-left wins ties, then
    /// top-right, then bottom-left.
    pub fn quadrant_index(&self, point: DVec2) -> usize {
        let mid = self.midpoint();
        let right = point.x > mid.x;
        let bottom = point.y > mid.y;
        match (right, bottom) {
            (false, false) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (true, true) => 3,
        }
    }

    /// 0 = top-left, 1 = top-right, 2 = bottom-left, 3 = bottom-right.
    pub fn sub_quadrant(&self, index: usize) -> Region {
        let mid = self.midpoint();
        match index {
            0 => Region::new(self.min.x, self.min.y, mid.x, mid.y),
            1 => Region::new(mid.x, self.min.y, self.max.x, mid.y),
            2 => Region::new(self.min.x, mid.y, mid.x, self.max.y),
            _ => Region::new(mid.x, mid.y, self.max.x, self.max.y),
        }
    }
}

/// Tunables shared by every node of one tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeConfig {
    /// Mass of a single body.
    pub gravity_constant: f64,
    pub max_speed: f64,
    pub theta: f64,
    pub softening_exponent: f64,
}

/// A body as seen by the tree: its handle and its position at insertion time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Member<K> {
    pub key: K,
    pub position: DVec2,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind<K> {
    Empty,
    Leaf(Member<K>),
    /// Several bodies in a cell too small to split further.
    Bucket(Vec<Member<K>>),
    Internal { children: [usize; 4] },
}

#[derive(Clone, Debug)]
pub struct Node<K> {
    pub bounds: Region,
    pub depth: u32,
    pub count: usize,
    pub position_sum: DVec2,
    pub center_of_mass: DVec2,
    pub kind: NodeKind<K>,
}

impl<K> Node<K> {
    pub fn empty(bounds: Region, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            count: 0,
            position_sum: DVec2::ZERO,
            center_of_mass: DVec2::ZERO,
            kind: NodeKind::Empty,
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self.kind, NodeKind::Internal { .. })
    }
}

/// Resolves tree handles back to the bodies they stand for.
pub trait BodyStore<K> {
    fn body_mut(&mut self, key: K) -> Option<&mut Body>;
}

impl BodyStore<usize> for [Body] {
    fn body_mut(&mut self, key: usize) -> Option<&mut Body> {
        self.get_mut(key)
    }
}

impl BodyStore<Entity> for Query<'_, '_, &mut Body> {
    fn body_mut(&mut self, key: Entity) -> Option<&mut Body> {
        self.get_mut(key).ok().map(Mut::into_inner)
    }
}

/// Barnes-Hut quadtree over a fixed domain, rebuilt every tick.
///
/// Nodes live in one arena; index 0 is the root. Children are only created
/// when a second body lands in an occupied leaf.
#[derive(Clone, Debug)]
pub struct QuadTree<K> {
    nodes: Vec<Node<K>>,
    config: TreeConfig,
    softening: f64,
}

impl<K: Copy + PartialEq> QuadTree<K> {
    pub fn new(width: f64, height: f64, config: TreeConfig) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            config,
            softening: softening_length(config.softening_exponent),
        };
        tree.reset(Region::from_size(width, height), config);
        tree
    }

    /// Drops every node but keeps the arena allocation for the next tick.
    pub fn reset(&mut self, domain: Region, config: TreeConfig) {
        self.nodes.clear();
        self.nodes.push(Node::empty(domain, 0));
        self.config = config;
        self.softening = softening_length(config.softening_exponent);
    }

    pub fn domain(&self) -> Region {
        self.root().bounds
    }

    pub fn root(&self) -> &Node<K> {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[Node<K>] {
        &self.nodes
    }

    /// Number of nodes, empty ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body_count() == 0
    }

    pub fn body_count(&self) -> usize {
        self.root().count
    }

    pub fn center_of_mass(&self) -> DVec2 {
        self.root().center_of_mass
    }

    /// Handles of every body held by a leaf.
    pub fn bodies(&self) -> impl Iterator<Item = K> + '_ {
        self.nodes.iter().flat_map(|node| {
            let members: &[Member<K>] = match &node.kind {
                NodeKind::Leaf(member) => std::slice::from_ref(member),
                NodeKind::Bucket(members) => members,
                _ => &[],
            };
            members.iter().map(|member| member.key)
        })
    }

    /// Places a body in the tree. Returns false if `position` lies outside the
    /// domain, leaving the tree untouched.
    pub fn insert(&mut self, key: K, position: DVec2) -> bool {
        self.insert_recursive(0, Member { key, position })
    }

    fn insert_recursive(&mut self, index: usize, member: Member<K>) -> bool {
        let node = &mut self.nodes[index];
        if !node.bounds.contains(member.position) {
            return false;
        }

        node.count += 1;
        node.position_sum += member.position;
        node.center_of_mass = node.position_sum / node.count as f64;

        match &mut node.kind {
            NodeKind::Empty => {
                node.kind = NodeKind::Leaf(member);
                true
            }
            NodeKind::Bucket(members) => {
                members.push(member);
                true
            }
            NodeKind::Internal { children } => {
                let child = children[node.bounds.quadrant_index(member.position)];
                self.insert_recursive(child, member)
            }
            NodeKind::Leaf(existing) => {
                let existing = *existing;
                if node.depth >= MAX_TREE_DEPTH || !node.bounds.can_subdivide() {
                    node.kind = NodeKind::Bucket(vec![existing, member]);
                    return true;
                }

                self.subdivide(index);
                // Both bodies are re-counted on their way down to the children.
                let node = &mut self.nodes[index];
                node.count = 0;
                node.position_sum = DVec2::ZERO;

                self.insert_recursive(index, existing) && self.insert_recursive(index, member)
            }
        }
    }

    fn subdivide(&mut self, index: usize) {
        let bounds = self.nodes[index].bounds;
        let depth = self.nodes[index].depth + 1;
        let mut children = [0; 4];
        for (quadrant, child) in children.iter_mut().enumerate() {
            *child = self.nodes.len();
            self.nodes.push(Node::empty(bounds.sub_quadrant(quadrant), depth));
        }
        self.nodes[index].kind = NodeKind::Internal { children };
    }

    /// Adds the tree's gravitational pull on `body` to its acceleration.
    /// `key` identifies the body so it does not attract itself.
    pub fn accumulate_gravity(&self, key: K, body: &mut Body) {
        body.acceleration += self.gravity_recursive(0, key, body.position);
    }

    fn gravity_recursive(&self, index: usize, key: K, position: DVec2) -> DVec2 {
        let node = &self.nodes[index];
        match &node.kind {
            NodeKind::Empty => return DVec2::ZERO,
            NodeKind::Leaf(member) if member.key != key => {
                return softened_acceleration(
                    member.position - position,
                    self.config.gravity_constant,
                    self.softening,
                );
            }
            NodeKind::Bucket(members) if members.iter().any(|member| member.key == key) => {
                let mut total = DVec2::ZERO;
                for member in members.iter().filter(|member| member.key != key) {
                    total += softened_acceleration(
                        member.position - position,
                        self.config.gravity_constant,
                        self.softening,
                    );
                }
                return total;
            }
            _ => {}
        }

        let size = node.bounds.width();
        let distance = position.distance(node.center_of_mass);
        if distance.is_nan() {
            return DVec2::ZERO;
        }

        // A zero distance makes the ratio infinite, so split nodes still open.
        if let NodeKind::Internal { children } = &node.kind
            && size / distance > self.config.theta
        {
            children.iter().fold(DVec2::ZERO, |acc, &child| {
                acc + self.gravity_recursive(child, key, position)
            })
        } else if distance <= 0.0 {
            DVec2::ZERO
        } else {
            softened_acceleration(
                node.center_of_mass - position,
                self.config.gravity_constant * node.count as f64,
                self.softening,
            )
        }
    }

    /// Runs one tick for every body held in the tree: clear acceleration,
    /// accumulate gravity over the whole tree, then integrate.
    pub fn step_simulation<S>(&self, dt: f64, store: &mut S)
    where
        S: BodyStore<K> + ?Sized,
    {
        let domain = self.domain();
        for key in self.bodies() {
            let Some(body) = store.body_mut(key) else {
                continue;
            };
            body.acceleration = DVec2::ZERO;
            self.accumulate_gravity(key, body);
            advance_body(body, dt, self.config.max_speed, &domain);
        }
    }
}

impl<K: Copy + PartialEq> Default for QuadTree<K> {
    fn default() -> Self {
        let config = crate::resources::SimConfig::default().tree_config();
        let bounds = crate::resources::SimulationBounds::default();
        Self::new(bounds.width, bounds.height, config)
    }
}

/// The tree of the current tick, shared between the physics and view systems.
#[derive(Resource, Default, Deref, DerefMut)]
pub struct QuadTreeResource(pub QuadTree<Entity>);

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn config(theta: f64) -> TreeConfig {
        TreeConfig {
            gravity_constant: 10.0,
            max_speed: 1.0e6,
            theta,
            softening_exponent: -8.0,
        }
    }

    fn assert_vec_close(a: DVec2, b: DVec2, tolerance: f64) {
        let diff = (a - b).length();
        assert!(
            diff <= tolerance,
            "expected {:?} to be within {} of {:?}, diff {}",
            a,
            tolerance,
            b,
            diff
        );
    }

    fn random_bodies(count: usize, seed: u64) -> Vec<Body> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let x = rng.random_range(0.0..600.0);
                let y = rng.random_range(0.0..600.0);
                Body::at(x, y)
            })
            .collect()
    }

    fn build(bodies: &[Body], theta: f64) -> QuadTree<usize> {
        let mut tree = QuadTree::new(600.0, 600.0, config(theta));
        for (index, body) in bodies.iter().enumerate() {
            assert!(tree.insert(index, body.position));
        }
        tree
    }

    fn exact_acceleration(bodies: &[Body], target: usize, config: &TreeConfig) -> DVec2 {
        let softening = softening_length(config.softening_exponent);
        bodies
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != target)
            .fold(DVec2::ZERO, |acc, (_, other)| {
                acc + softened_acceleration(
                    other.position - bodies[target].position,
                    config.gravity_constant,
                    softening,
                )
            })
    }

    #[test]
    fn insert_rejects_out_of_bounds_and_keeps_aggregates() {
        let mut tree = QuadTree::new(600.0, 600.0, config(0.5));
        assert!(tree.insert(0, DVec2::new(100.0, 100.0)));
        let before = (tree.body_count(), tree.root().position_sum);

        assert!(!tree.insert(1, DVec2::new(700.0, 10.0)));
        assert!(!tree.insert(2, DVec2::new(f64::NAN, 10.0)));
        assert_eq!((tree.body_count(), tree.root().position_sum), before);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn first_body_becomes_singleton_leaf() {
        let mut tree = QuadTree::new(600.0, 600.0, config(0.5));
        assert!(tree.insert(7, DVec2::new(50.0, 60.0)));
        assert_eq!(
            tree.root().kind,
            NodeKind::Leaf(Member {
                key: 7,
                position: DVec2::new(50.0, 60.0)
            })
        );
        assert_eq!(tree.center_of_mass(), DVec2::new(50.0, 60.0));
    }

    #[test]
    fn split_preserves_count_and_position_sum() {
        let mut tree = QuadTree::new(600.0, 600.0, config(0.5));
        tree.insert(0, DVec2::new(100.0, 100.0));
        tree.insert(1, DVec2::new(500.0, 450.0));

        let root = tree.root();
        assert!(root.is_split());
        assert_eq!(root.count, 2);
        assert_vec_close(root.position_sum, DVec2::new(600.0, 550.0), 1e-12);
        assert_vec_close(tree.center_of_mass(), DVec2::new(300.0, 275.0), 1e-12);

        let NodeKind::Internal { children } = root.kind else {
            panic!("root should be split");
        };
        assert_eq!(tree.nodes()[children[0]].count, 1);
        assert_eq!(tree.nodes()[children[3]].count, 1);
        assert_eq!(tree.nodes()[children[1]].kind, NodeKind::Empty);
        assert_eq!(tree.nodes()[children[2]].kind, NodeKind::Empty);
    }

    #[test]
    fn midpoint_ties_go_to_top_left() {
        let region = Region::from_size(600.0, 600.0);
        assert_eq!(region.quadrant_index(DVec2::new(300.0, 300.0)), 0);
        assert_eq!(region.quadrant_index(DVec2::new(301.0, 300.0)), 1);
        assert_eq!(region.quadrant_index(DVec2::new(300.0, 301.0)), 2);
        assert_eq!(region.quadrant_index(DVec2::new(600.0, 600.0)), 3);
        assert_eq!(region.sub_quadrant(1), Region::new(300.0, 0.0, 600.0, 300.0));
    }

    #[test]
    fn internal_aggregates_equal_sum_of_children() {
        let bodies = random_bodies(500, 7);
        let tree = build(&bodies, 0.5);
        assert_eq!(tree.body_count(), 500);
        assert_eq!(tree.bodies().count(), 500);

        for node in tree.nodes() {
            let NodeKind::Internal { children } = node.kind else {
                continue;
            };
            let count: usize = children.iter().map(|&c| tree.nodes()[c].count).sum();
            let weighted = children.iter().fold(DVec2::ZERO, |acc, &c| {
                let child = &tree.nodes()[c];
                acc + child.center_of_mass * child.count as f64
            });
            assert_eq!(node.count, count);
            assert_vec_close(node.center_of_mass, weighted / count as f64, 1e-9);
        }
    }

    #[test]
    fn coincident_bodies_share_a_bucket() {
        let mut tree = QuadTree::new(600.0, 600.0, config(0.5));
        for key in 0..3 {
            assert!(tree.insert(key, DVec2::new(123.0, 321.0)));
        }
        assert_eq!(tree.body_count(), 3);
        let bucket = tree
            .nodes()
            .iter()
            .find_map(|node| match &node.kind {
                NodeKind::Bucket(members) => Some(members.len()),
                _ => None,
            })
            .expect("coincident bodies end up in a bucket");
        assert_eq!(bucket, 3);
        assert!(tree.nodes().iter().all(|node| node.depth <= MAX_TREE_DEPTH));
    }

    #[test]
    fn coincident_bodies_feel_no_force_from_each_other() {
        let mut bodies = vec![Body::at(123.0, 321.0), Body::at(123.0, 321.0)];
        let tree = build(&bodies, 0.5);
        tree.accumulate_gravity(0, &mut bodies[0]);
        assert_eq!(bodies[0].acceleration, DVec2::ZERO);

        let mut probe = Body::at(223.0, 321.0);
        tree.accumulate_gravity(99, &mut probe);
        assert_vec_close(probe.acceleration, DVec2::new(-20.0 / 10_000.0, 0.0), 1e-12);
    }

    #[test]
    fn lone_body_feels_nothing() {
        let mut bodies = vec![Body::at(10.0, 10.0)];
        let tree = build(&bodies, 0.5);
        tree.accumulate_gravity(0, &mut bodies[0]);
        assert_eq!(bodies[0].acceleration, DVec2::ZERO);
    }

    #[test]
    fn pairwise_force_is_symmetric() {
        let mut bodies = vec![Body::at(100.0, 200.0), Body::at(400.0, 250.0)];
        let tree = build(&bodies, 0.5);
        let (first, second) = bodies.split_at_mut(1);
        tree.accumulate_gravity(0, &mut first[0]);
        tree.accumulate_gravity(1, &mut second[0]);
        let (a, b) = (bodies[0].acceleration, bodies[1].acceleration);
        assert!((a.length() - b.length()).abs() < 1e-15);
        assert_vec_close(a + b, DVec2::ZERO, 1e-15);
    }

    #[test]
    fn zero_theta_matches_all_pairs_sum() {
        let bodies = random_bodies(200, 42);
        let tree = build(&bodies, 0.0);
        for target in [0, 17, 199] {
            let mut body = bodies[target];
            tree.accumulate_gravity(target, &mut body);
            let exact = exact_acceleration(&bodies, target, &tree.config);
            assert_vec_close(body.acceleration, exact, 1e-9 * exact.length().max(1.0));
        }
    }

    #[test]
    fn target_on_center_of_mass_still_opens_split_nodes() {
        let bodies = vec![
            Body::at(300.0, 300.0),
            Body::at(100.0, 300.0),
            Body::at(400.0, 290.0),
            Body::at(400.0, 310.0),
        ];
        let tree = build(&bodies, 0.0);
        assert_vec_close(tree.center_of_mass(), DVec2::new(300.0, 300.0), 1e-12);

        let mut body = bodies[0];
        tree.accumulate_gravity(0, &mut body);
        let exact = exact_acceleration(&bodies, 0, &tree.config);
        assert!(exact.length() > 1e-4);
        assert_vec_close(body.acceleration, exact, 1e-12);
    }

    #[test]
    fn unsplittable_cell_becomes_bucket_before_depth_cap() {
        let edge = 1.0 + f64::EPSILON;
        let cell = Region::new(1.0, 1.0, edge, edge);
        assert!(!cell.can_subdivide());

        let mut tree = QuadTree::new(1.0, 1.0, config(0.5));
        tree.reset(cell, config(0.5));
        assert!(tree.insert(0, DVec2::new(1.0, 1.0)));
        assert!(tree.insert(1, DVec2::new(edge, 1.0)));

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root().depth, 0);
        let NodeKind::Bucket(members) = &tree.root().kind else {
            panic!("root should hold a bucket");
        };
        assert_eq!(members.len(), 2);
        assert_eq!(tree.body_count(), 2);
    }

    #[test]
    fn bucket_members_feel_exact_pulls_from_each_other() {
        let edge = 1.0 + f64::EPSILON;
        let bodies = vec![Body::at(1.0, 1.0), Body::at(edge, 1.0), Body::at(1.0, edge)];
        let mut tree = QuadTree::new(1.0, 1.0, config(0.5));
        tree.reset(Region::new(1.0, 1.0, edge, edge), config(0.5));
        for (index, body) in bodies.iter().enumerate() {
            assert!(tree.insert(index, body.position));
        }
        assert!(matches!(tree.root().kind, NodeKind::Bucket(_)));

        for target in 0..bodies.len() {
            let mut body = bodies[target];
            tree.accumulate_gravity(target, &mut body);
            let exact = exact_acceleration(&bodies, target, &tree.config);
            assert!(exact.length() > 0.0);
            assert_vec_close(body.acceleration, exact, 1e-9 * exact.length());
        }
    }

    #[test]
    fn smaller_theta_is_closer_to_exact() {
        let bodies = random_bodies(300, 3);
        let target = 11;
        let exact = exact_acceleration(&bodies, target, &config(0.0));
        let error = |theta: f64| {
            let tree = build(&bodies, theta);
            let mut body = bodies[target];
            tree.accumulate_gravity(target, &mut body);
            (body.acceleration - exact).length()
        };
        assert!(error(0.0) <= 1e-9 * exact.length().max(1.0));
        assert!(error(0.3) <= error(5.0) + 1e-12);
    }

    #[test]
    fn two_bodies_fall_toward_each_other() {
        let gravity = 10.0;
        let distance = 100.0;
        let dt = 0.01;
        let mut bodies = vec![Body::at(200.0, 300.0), Body::at(200.0 + distance, 300.0)];
        let tree = build(&bodies, 0.5);
        tree.step_simulation(dt, bodies.as_mut_slice());

        let expected_acc = gravity / (distance * distance);
        let expected_shift = 1.5 * expected_acc * dt * dt;
        assert_vec_close(bodies[0].acceleration, DVec2::new(expected_acc, 0.0), 1e-12);
        assert_vec_close(bodies[1].acceleration, DVec2::new(-expected_acc, 0.0), 1e-12);
        assert_vec_close(bodies[0].position, DVec2::new(200.0 + expected_shift, 300.0), 1e-12);
        assert_vec_close(
            bodies[1].position,
            DVec2::new(200.0 + distance - expected_shift, 300.0),
            1e-12,
        );
    }

    #[test]
    fn step_skips_bodies_not_in_tree() {
        let mut bodies = vec![Body::at(100.0, 100.0), Body::at(700.0, 100.0)];
        let mut tree = QuadTree::new(600.0, 600.0, config(0.5));
        assert!(tree.insert(0, bodies[0].position));
        assert!(!tree.insert(1, bodies[1].position));

        bodies[1].velocity = DVec2::new(5.0, 0.0);
        tree.step_simulation(0.1, bodies.as_mut_slice());
        assert_eq!(bodies[1].position, DVec2::new(700.0, 100.0));
    }

    #[test]
    fn reset_reuses_the_tree() {
        let bodies = random_bodies(50, 1);
        let mut tree = build(&bodies, 0.5);
        assert!(tree.len() > 1);
        tree.reset(Region::from_size(300.0, 300.0), config(0.8));
        assert_eq!(tree.len(), 1);
        assert!(tree.is_empty());
        assert_eq!(tree.domain(), Region::from_size(300.0, 300.0));
        assert_eq!(tree.config.theta, 0.8);
    }
}
