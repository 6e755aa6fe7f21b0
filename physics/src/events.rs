use crate::body::BodyId;
use rustc_hash::FxHashSet;

/// Something that happened during a world step. Queued on the world and drained by the caller.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum WorldEvent {
    BeginContact {
        body_a: BodyId,
        body_b: BodyId,
    },
    EndContact {
        body_a: BodyId,
        body_b: BodyId,
    },
    BeginShapeContact {
        body_a: BodyId,
        shape_a: usize,
        body_b: BodyId,
        shape_b: usize,
    },
    EndShapeContact {
        body_a: BodyId,
        shape_a: usize,
        body_b: BodyId,
        shape_b: usize,
    },
    /// A body pair touched this step after not touching the step before.
    Collide {
        body_a: BodyId,
        body_b: BodyId,
        impact_velocity: f32,
    },
    PreStep,
    PostStep,
    Sleepy {
        body: BodyId,
    },
    Sleep {
        body: BodyId,
    },
    WakeUp {
        body: BodyId,
    },
}

type BodyPairKey = (BodyId, BodyId);
type ShapePairKey = (BodyId, usize, BodyId, usize);

fn body_key(a: BodyId, b: BodyId) -> BodyPairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn shape_key(a: BodyId, shape_a: usize, b: BodyId, shape_b: usize) -> ShapePairKey {
    if a <= b {
        (a, shape_a, b, shape_b)
    } else {
        (b, shape_b, a, shape_a)
    }
}

/// Touching body and shape pairs for this step and the one before.
#[derive(Debug, Default)]
pub struct OverlapTracker {
    current: FxHashSet<BodyPairKey>,
    previous: FxHashSet<BodyPairKey>,
    current_shapes: FxHashSet<ShapePairKey>,
    previous_shapes: FxHashSet<ShapePairKey>,
}

impl OverlapTracker {
    /// Moves this step's pairs into the previous generation.
    pub fn begin_step(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
        std::mem::swap(&mut self.current_shapes, &mut self.previous_shapes);
        self.current.clear();
        self.current_shapes.clear();
    }

    /// Records a touching shape pair. Returns true if the body pair was not touching last step
    /// and this is the first time it is recorded this step.
    pub fn insert(&mut self, a: BodyId, shape_a: usize, b: BodyId, shape_b: usize) -> bool {
        self.current_shapes.insert(shape_key(a, shape_a, b, shape_b));
        let key = body_key(a, b);
        self.current.insert(key) && !self.previous.contains(&key)
    }

    pub fn is_touching(&self, a: BodyId, b: BodyId) -> bool {
        self.current.contains(&body_key(a, b))
    }

    /// Forgets a removed body so it produces no end events.
    pub fn remove_body(&mut self, body: BodyId) {
        self.current.retain(|&(a, b)| a != body && b != body);
        self.previous.retain(|&(a, b)| a != body && b != body);
        self.current_shapes.retain(|&(a, _, b, _)| a != body && b != body);
        self.previous_shapes.retain(|&(a, _, b, _)| a != body && b != body);
    }

    pub fn clear(&mut self) {
        self.current.clear();
        self.previous.clear();
        self.current_shapes.clear();
        self.previous_shapes.clear();
    }

    /// Appends begin and end events from the difference between the two generations, sorted so
    /// that runs are reproducible.
    pub fn emit_events(&self, events: &mut Vec<WorldEvent>) {
        let mut began: Vec<_> = self.current.difference(&self.previous).copied().collect();
        let mut ended: Vec<_> = self.previous.difference(&self.current).copied().collect();
        began.sort_unstable();
        ended.sort_unstable();
        events.extend(
            began
                .into_iter()
                .map(|(body_a, body_b)| WorldEvent::BeginContact { body_a, body_b }),
        );
        events.extend(
            ended
                .into_iter()
                .map(|(body_a, body_b)| WorldEvent::EndContact { body_a, body_b }),
        );

        let mut began: Vec<_> = self
            .current_shapes
            .difference(&self.previous_shapes)
            .copied()
            .collect();
        let mut ended: Vec<_> = self
            .previous_shapes
            .difference(&self.current_shapes)
            .copied()
            .collect();
        began.sort_unstable();
        ended.sort_unstable();
        events.extend(began.into_iter().map(|(body_a, shape_a, body_b, shape_b)| {
            WorldEvent::BeginShapeContact {
                body_a,
                shape_a,
                body_b,
                shape_b,
            }
        }));
        events.extend(ended.into_iter().map(|(body_a, shape_a, body_b, shape_b)| {
            WorldEvent::EndShapeContact {
                body_a,
                shape_a,
                body_b,
                shape_b,
            }
        }));
    }
}
