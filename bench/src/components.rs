//! Component types shared by the benchmark scenarios and microbenches.
//!
//! Sizes are chosen to cover the interesting column shapes: small hot
//! components (12 bytes), a cache-line-wide matrix (64 bytes), and
//! zero-sized markers for archetype fragmentation.

use quartz_macros::Component;

// =============================================================================
// Motion
// =============================================================================

/// World-space position.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Linear velocity.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Linear acceleration.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Acceleration {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Column-major model matrix. Wide on purpose: one of these fills a full
/// cache line, so transform-heavy loops measure bandwidth, not compute.
#[derive(Component, Clone, Copy, Debug)]
pub struct Transform {
    pub matrix: [[f32; 4]; 4],
}

impl Transform {
    pub const IDENTITY: Self = Self {
        matrix: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// =============================================================================
// Gameplay
// =============================================================================

/// Hit points.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

/// NPC brain: a state id, a retarget timer, and the current destination.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct AiState {
    pub state: u32,
    pub timer: f32,
    pub target_x: f32,
    pub target_y: f32,
}

/// Faction tag.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Team {
    pub id: u32,
}

// =============================================================================
// Effects
// =============================================================================

/// Marker for particle entities.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Particle;

/// Countdown until an entity is recycled.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Lifetime {
    pub remaining: f32,
    pub total: f32,
}

/// Straight RGBA, unclamped.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// 2D extent.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

// =============================================================================
// Fragmentation
// =============================================================================

/// Payload iterated across fragmented archetypes.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Data {
    pub value: f64,
}

/// Zero-sized tags. Pairing `Data` with a different tag per batch splits
/// one logical population across 26 archetypes.
macro_rules! markers {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Component, Clone, Copy, Debug, Default)]
            pub struct $name;
        )*
    };
}

markers!(
    MarkerA, MarkerB, MarkerC, MarkerD, MarkerE, MarkerF, MarkerG, MarkerH, MarkerI, MarkerJ,
    MarkerK, MarkerL, MarkerM, MarkerN, MarkerO, MarkerP, MarkerQ, MarkerR, MarkerS, MarkerT,
    MarkerU, MarkerV, MarkerW, MarkerX, MarkerY, MarkerZ,
);
