// Fighter state machine, per-fighter physics, and hit/hurt box derivation.

use serde::{Deserialize, Serialize};

use super::config::*;

/// Per-frame input for one fighter, as delivered over the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FighterInput {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub attack1: bool,
    pub attack2: bool,
    pub jump: bool,
    pub special: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Left,
    Right,
}

impl Facing {
    pub fn sign(self) -> f32 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FighterState {
    Idle,
    Walking,
    Running,
    Jumping,
    Falling,
    Attacking,
    Blocking,
    Hitstun,
    Knockdown,
    GettingUp,
    Ko,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackPhase {
    Startup,
    Active,
    Recovery,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackKind {
    #[serde(rename = "light_1")]
    Light1,
    #[serde(rename = "light_2")]
    Light2,
    #[serde(rename = "light_3")]
    Light3,
    #[serde(rename = "light_4")]
    Light4,
    #[serde(rename = "heavy")]
    Heavy,
    #[serde(rename = "air_light")]
    AirLight,
    #[serde(rename = "air_heavy")]
    AirHeavy,
    #[serde(rename = "special")]
    Special,
}

impl AttackKind {
    /// Index into the frame-data tables in `engine::config`.
    pub fn index(self) -> usize {
        match self {
            AttackKind::Light1 => ATTACK_LIGHT_1,
            AttackKind::Light2 => ATTACK_LIGHT_2,
            AttackKind::Light3 => ATTACK_LIGHT_3,
            AttackKind::Light4 => ATTACK_LIGHT_4,
            AttackKind::Heavy => ATTACK_HEAVY,
            AttackKind::AirLight => ATTACK_AIR_LIGHT,
            AttackKind::AirHeavy => ATTACK_AIR_HEAVY,
            AttackKind::Special => ATTACK_SPECIAL,
        }
    }

    pub fn total_frames(self) -> u32 {
        let i = self.index();
        STARTUP_FRAMES[i] + ACTIVE_FRAMES[i] + RECOVERY_FRAMES[i]
    }

    /// Next link in the grounded light chain, if any.
    pub fn next_in_chain(self) -> Option<AttackKind> {
        match self {
            AttackKind::Light1 => Some(AttackKind::Light2),
            AttackKind::Light2 => Some(AttackKind::Light3),
            AttackKind::Light3 => Some(AttackKind::Light4),
            _ => None,
        }
    }
}

/// Axis-aligned box used for both hitboxes and hurtboxes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// One fighter's full authoritative state.
#[derive(Debug, Clone)]
pub struct Fighter {
    pub health: i32,
    pub max_health: i32,
    pub magic: i32,
    pub max_magic: i32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub facing: Facing,
    pub state: FighterState,
    pub grounded: bool,
    pub can_act: bool,
    pub combo_count: u32,
    pub last_attack_frame: u64,
    pub last_hit_frame: u64,
    pub current_attack: Option<AttackKind>,
    pub last_attack: Option<AttackKind>,
    pub attack_phase: AttackPhase,
    pub state_start_frame: u64,
    pub invincible: bool,
    /// Duration of the hitstun currently being served.
    pub hitstun_frames: u32,
    /// Set once the current attack has connected; cleared on the next attack.
    pub has_hit: bool,
}

impl Fighter {
    pub fn new(side: usize) -> Self {
        let facing = if side == 0 { Facing::Right } else { Facing::Left };
        Fighter {
            health: MAX_HEALTH,
            max_health: MAX_HEALTH,
            magic: 0,
            max_magic: MAX_MAGIC,
            x: SPAWN_X[side],
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            facing,
            state: FighterState::Idle,
            grounded: true,
            can_act: true,
            combo_count: 0,
            last_attack_frame: 0,
            last_hit_frame: 0,
            current_attack: None,
            last_attack: None,
            attack_phase: AttackPhase::None,
            state_start_frame: 0,
            invincible: false,
            hitstun_frames: 0,
            has_hit: false,
        }
    }

    /// Reset to the round spawn: full health, empty meter, neutral state.
    pub fn reset_for_round(&mut self, side: usize, frame: u64) {
        let keep_max = self.max_health;
        *self = Fighter::new(side);
        self.max_health = keep_max;
        self.health = keep_max;
        self.state_start_frame = frame;
    }

    pub fn frames_in_state(&self, frame: u64) -> u32 {
        frame.saturating_sub(self.state_start_frame) as u32
    }

    pub fn set_state(&mut self, state: FighterState, frame: u64) {
        self.state = state;
        self.state_start_frame = frame;
        self.can_act = matches!(
            state,
            FighterState::Idle
                | FighterState::Walking
                | FighterState::Running
                | FighterState::Jumping
                | FighterState::Falling
                | FighterState::Blocking
        );
    }

    fn start_attack(&mut self, kind: AttackKind, frame: u64) {
        self.set_state(FighterState::Attacking, frame);
        self.current_attack = Some(kind);
        self.last_attack = Some(kind);
        self.last_attack_frame = frame;
        self.attack_phase = AttackPhase::Startup;
        self.has_hit = false;
    }

    /// Resolve input into a state transition. Only meaningful when `can_act`.
    pub fn apply_input(&mut self, input: &FighterInput, frame: u64) {
        if !self.can_act {
            return;
        }

        if input.special && self.magic >= SPECIAL_MAGIC_COST {
            self.magic -= SPECIAL_MAGIC_COST;
            self.start_attack(AttackKind::Special, frame);
            return;
        }

        if input.attack1 {
            let kind = if self.grounded {
                self.chained_light(frame)
            } else {
                AttackKind::AirLight
            };
            self.start_attack(kind, frame);
            return;
        }

        if input.attack2 {
            let kind = if self.grounded {
                AttackKind::Heavy
            } else {
                AttackKind::AirHeavy
            };
            self.start_attack(kind, frame);
            return;
        }

        if input.jump && self.grounded {
            self.set_state(FighterState::Jumping, frame);
            self.vy = JUMP_VELOCITY;
            self.grounded = false;
            return;
        }

        if input.down && self.grounded && !input.left && !input.right {
            if self.state != FighterState::Blocking {
                self.set_state(FighterState::Blocking, frame);
            }
            return;
        }

        if input.left || input.right {
            if self.grounded {
                // Held movement promotes walking to running.
                match self.state {
                    FighterState::Walking | FighterState::Running => {
                        if self.state != FighterState::Running {
                            self.set_state(FighterState::Running, frame);
                        }
                    }
                    _ => self.set_state(FighterState::Walking, frame),
                }
            }
            return;
        }

        if self.grounded && self.state != FighterState::Idle {
            self.set_state(FighterState::Idle, frame);
        }
    }

    /// Pick the light attack for an `attack1` press: advance the chain while
    /// its window is live, otherwise restart at light_1.
    fn chained_light(&self, frame: u64) -> AttackKind {
        if let Some(prev) = self.last_attack {
            if frame.saturating_sub(self.last_attack_frame) <= CHAIN_WINDOW_FRAMES {
                if let Some(next) = prev.next_in_chain() {
                    return next;
                }
            }
        }
        AttackKind::Light1
    }

    /// Face the opponent whenever free to act and not mid-attack.
    pub fn face_toward(&mut self, opponent_x: f32) {
        if self.can_act && self.state != FighterState::Attacking {
            self.facing = if opponent_x >= self.x {
                Facing::Right
            } else {
                Facing::Left
            };
        }
    }

    /// Integrate one tick of movement. `dir` is the horizontal input axis
    /// (-1, 0, or 1), already zeroed by the caller when the fighter cannot act.
    pub fn integrate(&mut self, dir: f32, dt: f32, frame: u64) {
        let max_speed = match self.state {
            FighterState::Running => RUN_SPEED,
            _ => WALK_SPEED,
        };
        let target = dir * max_speed;
        let t = (ACCEL * dt).min(1.0);
        self.vx += (target - self.vx) * t;
        self.vx = self.vx.clamp(-RUN_SPEED, RUN_SPEED);

        if !self.grounded {
            self.vy -= GRAVITY * dt;
            if self.vy < 0.0 && self.state == FighterState::Jumping {
                self.set_state(FighterState::Falling, frame);
            }
        }

        self.x += self.vx * dt;
        self.y += self.vy * dt;

        self.x = self
            .x
            .clamp(FIGHTER_HALF_WIDTH, STAGE_WIDTH - FIGHTER_HALF_WIDTH);

        if self.y > 0.0 {
            self.grounded = false;
        } else {
            self.y = 0.0;
            if !self.grounded {
                self.grounded = true;
                self.vy = 0.0;
                self.on_land(frame);
            }
        }
    }

    fn on_land(&mut self, frame: u64) {
        if matches!(self.state, FighterState::Jumping | FighterState::Falling) {
            self.set_state(FighterState::Idle, frame);
        }
    }

    /// Advance timed transitions: attack phases, hitstun, knockdown, getup,
    /// and the combo window.
    pub fn tick_state(&mut self, frame: u64) {
        let fis = self.frames_in_state(frame);
        match self.state {
            FighterState::Attacking => {
                if let Some(kind) = self.current_attack {
                    let i = kind.index();
                    let startup = STARTUP_FRAMES[i];
                    let active_end = startup + ACTIVE_FRAMES[i];
                    let total = active_end + RECOVERY_FRAMES[i];
                    if fis < startup {
                        self.attack_phase = AttackPhase::Startup;
                    } else if fis < active_end {
                        self.attack_phase = AttackPhase::Active;
                    } else if fis < total {
                        self.attack_phase = AttackPhase::Recovery;
                    } else {
                        self.current_attack = None;
                        self.attack_phase = AttackPhase::None;
                        let next = if self.grounded {
                            FighterState::Idle
                        } else {
                            FighterState::Falling
                        };
                        self.set_state(next, frame);
                    }
                } else {
                    // Attacking without an attack is unreachable; recover to idle.
                    self.attack_phase = AttackPhase::None;
                    self.set_state(FighterState::Idle, frame);
                }
            }
            FighterState::Hitstun => {
                if fis >= self.hitstun_frames {
                    let next = if self.grounded {
                        FighterState::Idle
                    } else {
                        FighterState::Falling
                    };
                    self.set_state(next, frame);
                }
            }
            FighterState::Knockdown => {
                if fis >= KNOCKDOWN_FRAMES {
                    self.set_state(FighterState::GettingUp, frame);
                    self.invincible = true;
                }
            }
            FighterState::GettingUp => {
                if fis >= GETUP_INVULN_FRAMES {
                    self.invincible = false;
                }
                if fis >= GETUP_FRAMES {
                    self.set_state(FighterState::Idle, frame);
                }
            }
            _ => {}
        }

        if self.combo_count > 0
            && frame.saturating_sub(self.last_hit_frame) > COMBO_WINDOW_FRAMES
        {
            self.combo_count = 0;
        }
    }

    pub fn is_vulnerable(&self) -> bool {
        self.state != FighterState::Ko
            && self.state != FighterState::Blocking
            && !self.invincible
    }

    pub fn is_attacking(&self) -> bool {
        self.state == FighterState::Attacking
    }

    pub fn hurtbox(&self) -> Rect {
        Rect {
            x: self.x - FIGHTER_HALF_WIDTH,
            y: self.y,
            w: FIGHTER_HALF_WIDTH * 2.0,
            h: FIGHTER_HEIGHT,
        }
    }

    /// The attack's hitbox, present only while the attack is in its active
    /// phase. Covers the attacker's front half and reaches `range` past the
    /// front edge, so overlapping fighters in the corner still connect.
    pub fn hitbox(&self) -> Option<Rect> {
        if self.attack_phase != AttackPhase::Active {
            return None;
        }
        let kind = self.current_attack?;
        let i = kind.index();
        let reach = FIGHTER_HALF_WIDTH + HITBOX_RANGE[i];
        let x = match self.facing {
            Facing::Right => self.x,
            Facing::Left => self.x - reach,
        };
        Some(Rect {
            x,
            y: self.y,
            w: reach,
            h: HITBOX_HEIGHT[i],
        })
    }

    /// Apply an incoming hit. Returns true if the fighter was KO'd.
    pub fn take_hit(
        &mut self,
        damage: i32,
        knockback_x: f32,
        knockback_y: f32,
        hitstun: u32,
        knockdown: bool,
        frame: u64,
    ) -> bool {
        self.health = (self.health - damage).max(0);
        self.current_attack = None;
        self.attack_phase = AttackPhase::None;

        self.vx = knockback_x;
        if knockback_y > 0.0 {
            self.vy = knockback_y;
            self.grounded = false;
        }

        if self.health == 0 {
            self.set_state(FighterState::Ko, frame);
            return true;
        }

        if knockdown {
            self.set_state(FighterState::Knockdown, frame);
        } else {
            self.hitstun_frames = hitstun;
            self.set_state(FighterState::Hitstun, frame);
        }
        false
    }
}

/// Public per-fighter state, snapshotted for replays, spectators, and bots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FighterSnapshot {
    pub health: i32,
    pub max_health: i32,
    pub magic: i32,
    pub max_magic: i32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub facing: Facing,
    pub state: FighterState,
    pub grounded: bool,
    pub can_act: bool,
    pub combo_count: u32,
    pub current_attack: Option<AttackKind>,
    pub attack_phase: AttackPhase,
    pub invincible: bool,
}

impl Fighter {
    pub fn snapshot(&self) -> FighterSnapshot {
        FighterSnapshot {
            health: self.health,
            max_health: self.max_health,
            magic: self.magic,
            max_magic: self.max_magic,
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            facing: self.facing,
            state: self.state,
            grounded: self.grounded,
            can_act: self.can_act,
            combo_count: self.combo_count,
            current_attack: self.current_attack,
            attack_phase: self.attack_phase,
            invincible: self.invincible,
        }
    }
}
