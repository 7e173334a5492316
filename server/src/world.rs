//! Entities owned by the simulation: arena, players, bullets and the
//! per-player input snapshot.

use crate::physics::Vector2;
use shared::{BulletState, InputMessage, PlayerState};

/// Fixed rectangular play field, `[0, width] x [0, height]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
}

impl Arena {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Vector2 {
        Vector2::new(self.width / 2.0, self.height / 2.0)
    }

    /// True if a point lies inside the arena, edges included
    pub fn contains(&self, point: Vector2) -> bool {
        (0.0..=self.width).contains(&point.x) && (0.0..=self.height).contains(&point.y)
    }

    /// Clamps the center of a body of `radius` so the whole body stays inside
    pub fn clamp(&self, position: Vector2, radius: f32) -> Vector2 {
        if !position.is_finite() {
            return self.center();
        }
        Vector2::new(
            position.x.clamp(radius, self.width - radius),
            position.y.clamp(radius, self.height - radius),
        )
    }
}

/// Requested aim, resolved against the player's position at tick time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aim {
    Angle(f32),
    Target(Vector2),
    Direction(Vector2),
}

impl Aim {
    /// Resolves to an angle in radians; `None` means "keep the previous aim"
    pub fn resolve(self, origin: Vector2) -> Option<f32> {
        match self {
            Aim::Angle(angle) if angle.is_finite() => Some(angle.sin().atan2(angle.cos())),
            Aim::Angle(_) => None,
            Aim::Target(point) => (point - origin).angle(),
            Aim::Direction(direction) => direction.angle(),
        }
    }
}

/// Latest desired action of one player. Replaced wholesale by every INPUT.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    /// Desired direction; magnitude is a fraction of max speed, capped at 1
    pub movement: Vector2,
    pub aim: Option<Aim>,
    pub fire: bool,
}

impl From<&InputMessage> for InputSnapshot {
    fn from(msg: &InputMessage) -> Self {
        let movement = msg
            .movement
            .map(Vector2::from)
            .or_else(|| msg.keys.map(|keys| Vector2::from(keys.to_vector())))
            .filter(Vector2::is_finite)
            .unwrap_or_default();

        let aim = if let Some(angle) = msg.aim {
            Some(Aim::Angle(angle))
        } else if let Some(target) = msg.target {
            Some(Aim::Target(target.into()))
        } else {
            msg.shoot_dir.map(|dir| Aim::Direction(dir.into()))
        };

        Self {
            movement,
            aim,
            fire: msg.fire,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub position: Vector2,
    pub velocity: Vector2,
    /// Facing in radians
    pub aim: f32,
    pub alive: bool,
    pub score: u32,
    pub ammo: u32,
    /// Ticks until respawn, only while dead
    pub respawn_ticks: Option<u32>,
    /// Ticks until the next shot is allowed
    pub fire_cooldown: u32,
}

impl Player {
    pub fn new(id: u32, name: String, color: String, position: Vector2, ammo: u32) -> Self {
        Self {
            id,
            name,
            color,
            position,
            velocity: Vector2::zero(),
            aim: 0.0,
            alive: true,
            score: 0,
            ammo,
            respawn_ticks: None,
            fire_cooldown: 0,
        }
    }

    pub fn to_state(&self) -> PlayerState {
        PlayerState {
            id: self.id,
            name: self.name.clone(),
            color: self.color.clone(),
            x: self.position.x,
            y: self.position.y,
            aim: self.aim,
            alive: self.alive,
            score: self.score,
            ammo: self.ammo,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub id: u64,
    pub owner: u32,
    pub position: Vector2,
    pub velocity: Vector2,
    pub spawn_tick: u64,
    /// Integration steps left before the bullet expires
    pub remaining_ticks: u32,
}

impl Bullet {
    pub fn to_state(&self) -> BulletState {
        BulletState {
            id: self.id,
            owner: self.owner,
            x: self.position.x,
            y: self.position.y,
        }
    }
}
