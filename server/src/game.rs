//! Authoritative simulation engine
//!
//! `GameState` owns the whole world: players, live bullets, the tick counter
//! and the spawn RNG. Each call to [`GameState::tick`] advances exactly one
//! fixed step of `1 / tick_rate` seconds:
//!
//! 1. apply the latest input snapshot of every player
//! 2. integrate player motion, clamped to the arena
//! 3. fire bullets (level-triggered, limited by ammo and cooldown)
//! 4. integrate bullets and drop the ones that expired or left the arena
//! 5. resolve bullet hits in bullet-id then player-id order
//! 6. respawn players whose timer ran out
//!
//! The engine never fails. Non-finite or oversized inputs are clamped or
//! ignored so one misbehaving client cannot corrupt the shared world.

use crate::config::{GameConfig, SpawnMode};
use crate::physics::Vector2;
use crate::utils::generate_color;
use crate::world::{Arena, Bullet, InputSnapshot, Player};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::StateMessage;
use std::collections::{BTreeMap, HashMap};

/// A bullet hit resolved during the last tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub bullet: u64,
    pub shooter: u32,
    pub victim: u32,
}

#[derive(Debug, Clone)]
pub struct GameState {
    config: GameConfig,
    arena: Arena,
    tick: u64,
    players: BTreeMap<u32, Player>,
    bullets: BTreeMap<u64, Bullet>,
    next_bullet_id: u64,
    last_hits: Vec<Hit>,
    rng: StdRng,
}

impl GameState {
    pub fn new(config: GameConfig) -> Self {
        let rng = config
            .seed
            .map(StdRng::seed_from_u64)
            .unwrap_or_else(StdRng::from_entropy);

        Self {
            arena: Arena::new(config.arena_width, config.arena_height),
            config,
            tick: 0,
            players: BTreeMap::new(),
            bullets: BTreeMap::new(),
            next_bullet_id: 1,
            last_hits: Vec::new(),
            rng,
        }
    }

    /// Number of the last completed tick, 0 before the first one
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Players in increasing id order
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Live bullets in increasing id order
    pub fn bullets(&self) -> impl Iterator<Item = &Bullet> {
        self.bullets.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn last_hits(&self) -> &[Hit] {
        &self.last_hits
    }

    /// Inserts a player at a spawn position. Returns false if the id is taken.
    pub fn add_player(&mut self, id: u32, name: String) -> bool {
        if self.players.contains_key(&id) {
            return false;
        }

        let position = self.spawn_position(id);
        let player = Player::new(id, name, generate_color(id), position, self.config.max_ammo);

        info!(
            "Added player {} ({}) at ({:.1}, {:.1})",
            id, player.name, position.x, position.y
        );
        self.players.insert(id, player);
        true
    }

    /// Removes a player. Safe to call for ids that are already gone.
    pub fn remove_player(&mut self, id: u32) -> bool {
        match self.players.remove(&id) {
            Some(player) => {
                info!("Removed player {} ({})", id, player.name);
                true
            }
            None => false,
        }
    }

    /// Advances the world by one fixed step and returns the resulting state.
    ///
    /// `inputs` holds the current snapshot of each player; players without
    /// an entry keep their previous velocity and aim and do not fire.
    pub fn tick(&mut self, inputs: &HashMap<u32, InputSnapshot>) -> StateMessage {
        self.tick += 1;

        self.apply_inputs(inputs);
        self.integrate_players();
        self.fire_bullets(inputs);
        self.integrate_bullets();
        self.resolve_collisions();
        self.respawn_players();

        self.snapshot()
    }

    /// Immutable copy of the current world, ordered by id
    pub fn snapshot(&self) -> StateMessage {
        StateMessage {
            tick: self.tick,
            players: self.players.values().map(Player::to_state).collect(),
            bullets: self.bullets.values().map(Bullet::to_state).collect(),
        }
    }

    fn apply_inputs(&mut self, inputs: &HashMap<u32, InputSnapshot>) {
        let max_speed = self.config.max_speed;

        for player in self.players.values_mut().filter(|p| p.alive) {
            let Some(input) = inputs.get(&player.id) else {
                continue;
            };

            let movement = if input.movement.is_finite() {
                input.movement.clamp_magnitude(1.0)
            } else {
                Vector2::zero()
            };
            player.velocity = movement.scale(max_speed);

            if let Some(angle) = input.aim.and_then(|aim| aim.resolve(player.position)) {
                player.aim = angle;
            }
        }
    }

    fn integrate_players(&mut self) {
        let dt = self.config.dt();
        let radius = self.config.player_radius;
        let arena = self.arena;

        for player in self.players.values_mut().filter(|p| p.alive) {
            player.position = arena.clamp(player.position + player.velocity.scale(dt), radius);
        }
    }

    fn fire_bullets(&mut self, inputs: &HashMap<u32, InputSnapshot>) {
        let lifetime = self.config.bullet_lifetime_ticks();
        let bullet_speed = self.config.bullet_speed;
        let cooldown = self.config.fire_cooldown_ticks;

        for player in self.players.values_mut() {
            if player.fire_cooldown > 0 {
                player.fire_cooldown -= 1;
                continue;
            }

            let wants_fire = inputs.get(&player.id).is_some_and(|input| input.fire);
            if !wants_fire || !player.alive || player.ammo == 0 {
                continue;
            }

            player.ammo -= 1;
            player.fire_cooldown = cooldown;

            let id = self.next_bullet_id;
            self.next_bullet_id += 1;
            self.bullets.insert(
                id,
                Bullet {
                    id,
                    owner: player.id,
                    position: player.position,
                    velocity: Vector2::from_angle(player.aim).scale(bullet_speed),
                    spawn_tick: self.tick,
                    remaining_ticks: lifetime,
                },
            );
        }
    }

    fn integrate_bullets(&mut self) {
        let dt = self.config.dt();
        let arena = self.arena;

        self.bullets.retain(|_, bullet| {
            if bullet.remaining_ticks == 0 {
                return false;
            }
            bullet.position = bullet.position + bullet.velocity.scale(dt);
            bullet.remaining_ticks -= 1;
            arena.contains(bullet.position)
        });
    }

    fn resolve_collisions(&mut self) {
        self.last_hits.clear();

        let radius = self.config.player_radius;
        let hit_score = self.config.hit_score;
        let respawn_ticks = self.config.respawn_ticks();

        let bullet_ids: Vec<u64> = self.bullets.keys().copied().collect();
        for bullet_id in bullet_ids {
            let Some((owner, position)) = self.bullets.get(&bullet_id).map(|b| (b.owner, b.position))
            else {
                continue;
            };

            let victim = self
                .players
                .values()
                .find(|p| p.alive && p.id != owner && p.position.distance(&position) <= radius)
                .map(|p| p.id);
            let Some(victim) = victim else {
                continue;
            };

            self.bullets.remove(&bullet_id);

            if let Some(player) = self.players.get_mut(&victim) {
                player.alive = false;
                player.velocity = Vector2::zero();
                player.respawn_ticks = Some(respawn_ticks);
            }
            // The shooter may have left while the bullet was in flight
            if let Some(shooter) = self.players.get_mut(&owner) {
                shooter.score = shooter.score.saturating_add(hit_score);
            }

            debug!(
                "Tick {}: bullet {} from player {} hit player {}",
                self.tick, bullet_id, owner, victim
            );
            self.last_hits.push(Hit {
                bullet: bullet_id,
                shooter: owner,
                victim,
            });
        }
    }

    fn respawn_players(&mut self) {
        let dead: Vec<u32> = self
            .players
            .values()
            .filter(|p| !p.alive)
            .map(|p| p.id)
            .collect();

        for id in dead {
            let due = match self.players.get_mut(&id).and_then(|p| p.respawn_ticks.as_mut()) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    false
                }
                _ => true,
            };
            if !due {
                continue;
            }

            let position = self.spawn_position(id);
            let max_ammo = self.config.max_ammo;
            if let Some(player) = self.players.get_mut(&id) {
                player.alive = true;
                player.position = position;
                player.velocity = Vector2::zero();
                player.ammo = max_ammo;
                player.respawn_ticks = None;
                player.fire_cooldown = 0;
                debug!(
                    "Player {} respawned at ({:.1}, {:.1})",
                    id, position.x, position.y
                );
            }
        }
    }

    /// Picks a spawn point that no other live player occupies exactly.
    ///
    /// Candidates step one body diameter at a time from the configured point,
    /// wrapping across the arena row by row.
    fn spawn_position(&mut self, exclude: u32) -> Vector2 {
        let radius = self.config.player_radius;
        let base = match self.config.spawn_mode {
            SpawnMode::Fixed { x, y } => Vector2::new(x, y),
            SpawnMode::Random => Vector2::new(
                self.rng.gen_range(radius..=self.arena.width - radius),
                self.rng.gen_range(radius..=self.arena.height - radius),
            ),
        };
        let base = self.arena.clamp(base, radius);

        let span_x = self.arena.width - 2.0 * radius;
        let span_y = self.arena.height - 2.0 * radius;
        let step = 2.0 * radius;
        let columns = ((span_x / step).floor() as u32).max(1);

        let occupied = |players: &BTreeMap<u32, Player>, at: Vector2| {
            players
                .values()
                .any(|p| p.alive && p.id != exclude && p.position == at)
        };

        let mut candidate = base;
        for attempt in 0..=self.players.len() as u32 {
            if attempt > 0 {
                let dx = step * (attempt % columns) as f32;
                let dy = step * (attempt / columns) as f32;
                candidate = Vector2::new(
                    radius + (base.x - radius + dx).rem_euclid(span_x),
                    radius + (base.y - radius + dy).rem_euclid(span_y),
                );
            }
            if !occupied(&self.players, candidate) {
                break;
            }
        }
        candidate
    }
}
