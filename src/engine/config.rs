// Fighting tuning constants. Frame data is authored for 60 Hz.

// Attack kinds (indexes into the frame-data tables below)
pub const ATTACK_LIGHT_1: usize = 0;
pub const ATTACK_LIGHT_2: usize = 1;
pub const ATTACK_LIGHT_3: usize = 2;
pub const ATTACK_LIGHT_4: usize = 3;
pub const ATTACK_HEAVY: usize = 4;
pub const ATTACK_AIR_LIGHT: usize = 5;
pub const ATTACK_AIR_HEAVY: usize = 6;
pub const ATTACK_SPECIAL: usize = 7;

pub const ATTACK_KINDS: usize = 8;

// Health / meter
pub const MAX_HEALTH: i32 = 1000;
pub const MAX_MAGIC: i32 = 100;
pub const SPECIAL_MAGIC_COST: i32 = 30;
pub const MAGIC_GAIN_ON_HIT: i32 = 8;

// Stage, in pixels. Ground is y = 0, up is +y.
pub const STAGE_WIDTH: f32 = 800.0;
pub const FIGHTER_HALF_WIDTH: f32 = 25.0;
pub const FIGHTER_HEIGHT: f32 = 90.0;
pub const SPAWN_X: [f32; 2] = [250.0, 550.0];

// Physics (units per second)
pub const WALK_SPEED: f32 = 150.0;
pub const RUN_SPEED: f32 = 260.0;
pub const ACCEL: f32 = 12.0;
pub const JUMP_VELOCITY: f32 = 420.0;
pub const GRAVITY: f32 = 1200.0;

// Frame budgets per attack kind [light1, light2, light3, light4, heavy, air_light, air_heavy, special]
pub const STARTUP_FRAMES: [u32; ATTACK_KINDS] = [3, 3, 4, 5, 8, 4, 7, 10];
pub const ACTIVE_FRAMES: [u32; ATTACK_KINDS] = [2, 2, 2, 3, 4, 3, 4, 6];
pub const RECOVERY_FRAMES: [u32; ATTACK_KINDS] = [6, 7, 8, 10, 14, 8, 12, 18];

pub const BASE_DAMAGE: [i32; ATTACK_KINDS] = [40, 45, 50, 60, 90, 50, 80, 140];
pub const HITSTUN_FRAMES: [u32; ATTACK_KINDS] = [12, 14, 16, 20, 22, 14, 18, 26];

// Horizontal knockback is signed away from the attacker; vertical lifts the defender.
pub const KNOCKBACK_X: [f32; ATTACK_KINDS] = [60.0, 70.0, 80.0, 140.0, 180.0, 70.0, 120.0, 220.0];
pub const KNOCKBACK_Y: [f32; ATTACK_KINDS] = [0.0, 0.0, 0.0, 120.0, 60.0, 40.0, 80.0, 160.0];

pub const CAUSES_KNOCKDOWN: [bool; ATTACK_KINDS] =
    [false, false, false, true, false, false, true, true];

// Hitbox reach from the fighter's front edge, and its vertical extent.
pub const HITBOX_RANGE: [f32; ATTACK_KINDS] = [70.0, 70.0, 75.0, 80.0, 90.0, 75.0, 85.0, 130.0];
pub const HITBOX_HEIGHT: [f32; ATTACK_KINDS] = [70.0, 70.0, 70.0, 90.0, 80.0, 90.0, 90.0, 90.0];

// Light chain: a follow-up light pressed within this many frames of the
// previous light's start advances the chain instead of restarting it.
pub const CHAIN_WINDOW_FRAMES: u64 = 16;

// Combo scaling: hits beyond COMBO_SCALING_START are scaled by
// COMBO_DAMAGE_FACTOR per extra hit, floored at COMBO_DAMAGE_FLOOR.
pub const COMBO_SCALING_START: u32 = 2;
pub const COMBO_DAMAGE_FACTOR: f32 = 0.9;
pub const COMBO_DAMAGE_FLOOR: f32 = 0.5;
pub const COMBO_WINDOW_FRAMES: u64 = 45;

pub const COUNTER_HIT_MULTIPLIER: f32 = 1.25;

// Timed state budgets, in frames
pub const KNOCKDOWN_FRAMES: u32 = 40;
pub const GETUP_FRAMES: u32 = 30;
pub const GETUP_INVULN_FRAMES: u32 = 20;

// Round / match lifecycle
pub const COUNTDOWN_FRAMES: u32 = 90;
pub const KO_FREEZE_FRAMES: u32 = 60;
pub const ROUND_END_FRAMES: u32 = 120;
pub const DEFAULT_ROUND_SECONDS: u32 = 99;
pub const DEFAULT_ROUNDS_TO_WIN: u32 = 2;

// In-range hints included in observations
pub const NORMAL_ATTACK_RANGE: f32 = 120.0;
pub const SPECIAL_ATTACK_RANGE: f32 = 180.0;
