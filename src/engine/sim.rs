// Authoritative fighting simulation.
//
// The simulation is a deterministic function of (previous state, per-fighter
// input, tick): no clocks, no randomness, no map iteration. Each tick runs
// input resolution, physics, the two hit checks, the fighter state machines,
// and the round/match lifecycle, in that order.

use serde::{Deserialize, Serialize};

use super::config::*;
use super::fighter::{
    AttackKind, AttackPhase, Facing, Fighter, FighterInput, FighterSnapshot, FighterState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSide {
    P1,
    P2,
}

impl PlayerSide {
    pub fn index(self) -> usize {
        match self {
            PlayerSide::P1 => 0,
            PlayerSide::P2 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Countdown,
    Fighting,
    Ko,
    RoundEnd,
    Timeout,
    MatchEnd,
}

/// Simulation tuning that varies per match.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    pub tick_rate: u32,
    pub rounds_to_win: u32,
    pub round_seconds: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            tick_rate: 60,
            rounds_to_win: DEFAULT_ROUNDS_TO_WIN,
            round_seconds: DEFAULT_ROUND_SECONDS,
        }
    }
}

/// Events emitted by the simulation while ticking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SimEvent {
    RoundStart {
        round: u32,
        frame: u64,
    },
    Damage {
        attacker: String,
        defender: String,
        attack: AttackKind,
        damage: i32,
        is_combo: bool,
        combo_index: u32,
        counter_hit: bool,
        defender_health: i32,
        frame: u64,
    },
    Ko {
        winner: Option<String>,
        loser: String,
        round: u32,
        frame: u64,
    },
    Timeout {
        round: u32,
        winner: Option<String>,
        frame: u64,
    },
    RoundEnd {
        round: u32,
        winner: Option<String>,
        frame: u64,
    },
    MatchEnd {
        winner: Option<String>,
        p1_rounds: u32,
        p2_rounds: u32,
        frame: u64,
    },
}

/// Deep-copyable public state for one frame, used for replay frames and
/// spectator broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimSnapshot {
    pub match_id: String,
    pub frame: u64,
    pub phase: MatchPhase,
    pub round: u32,
    pub p1_rounds_won: u32,
    pub p2_rounds_won: u32,
    pub time_remaining: u32,
    pub p1: FighterSnapshot,
    pub p2: FighterSnapshot,
    pub winner: Option<String>,
}

/// What one bot is shown about itself each frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfView {
    pub health: i32,
    pub health_percent: f32,
    pub magic: i32,
    pub magic_percent: f32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub state: FighterState,
    pub facing: Facing,
    pub grounded: bool,
    pub can_act: bool,
    pub combo_count: u32,
}

/// What one bot is shown about its opponent each frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentView {
    pub health: i32,
    pub health_percent: f32,
    pub x: f32,
    pub y: f32,
    pub state: FighterState,
    pub facing: Facing,
    pub attacking: bool,
    pub blocking: bool,
    pub vulnerable: bool,
    pub grounded: bool,
}

/// Per-frame observation pushed to a bot during the fighting phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub frame: u64,
    pub round: u32,
    pub my_rounds_won: u32,
    pub opp_rounds_won: u32,
    pub time_remaining: u32,
    pub you: SelfView,
    pub opponent: OpponentView,
    pub distance_x: f32,
    pub distance_y: f32,
    pub in_normal_range: bool,
    pub in_special_range: bool,
    pub valid_actions: Vec<String>,
    /// Wall-clock deadline for the next INPUT, stamped by the match runtime.
    pub decision_deadline_ms: u64,
}

struct HitResolution {
    kind: AttackKind,
    damage: i32,
    combo_index: u32,
    counter_hit: bool,
    knockback_x: f32,
    knockback_y: f32,
    hitstun: u32,
    knockdown: bool,
}

pub struct Simulation {
    match_id: String,
    bot_ids: [String; 2],
    config: SimConfig,
    frame: u64,
    phase: MatchPhase,
    fighters: [Fighter; 2],
    round: u32,
    rounds_won: [u32; 2],
    timer_frames: u32,
    phase_timer: u32,
    round_winner: Option<usize>,
    winner: Option<usize>,
    max_rounds: u32,
}

impl Simulation {
    pub fn new(match_id: &str, p1_id: &str, p2_id: &str, config: SimConfig) -> Self {
        Simulation {
            match_id: match_id.to_string(),
            bot_ids: [p1_id.to_string(), p2_id.to_string()],
            config,
            frame: 0,
            phase: MatchPhase::Countdown,
            fighters: [Fighter::new(0), Fighter::new(1)],
            round: 1,
            rounds_won: [0, 0],
            timer_frames: config.round_seconds * config.tick_rate,
            phase_timer: COUNTDOWN_FRAMES,
            round_winner: None,
            winner: None,
            max_rounds: config.rounds_to_win * 2 + 1,
        }
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn bot_id(&self, side: PlayerSide) -> &str {
        &self.bot_ids[side.index()]
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn is_over(&self) -> bool {
        self.phase == MatchPhase::MatchEnd
    }

    pub fn rounds_won(&self) -> (u32, u32) {
        (self.rounds_won[0], self.rounds_won[1])
    }

    pub fn winner_id(&self) -> Option<&str> {
        self.winner.map(|i| self.bot_ids[i].as_str())
    }

    pub fn time_remaining(&self) -> u32 {
        let rate = self.config.tick_rate;
        (self.timer_frames + rate - 1) / rate
    }

    /// Advance the simulation by one tick.
    pub fn tick(&mut self, inputs: [FighterInput; 2]) -> Vec<SimEvent> {
        let mut events = Vec::new();
        let frame = self.frame;

        match self.phase {
            MatchPhase::Countdown => {
                self.phase_timer = self.phase_timer.saturating_sub(1);
                if self.phase_timer == 0 {
                    self.phase = MatchPhase::Fighting;
                    events.push(SimEvent::RoundStart {
                        round: self.round,
                        frame,
                    });
                }
            }
            MatchPhase::Fighting => {
                self.tick_fighting(&inputs, &mut events);
            }
            MatchPhase::Ko | MatchPhase::Timeout => {
                self.phase_timer = self.phase_timer.saturating_sub(1);
                if self.phase_timer == 0 {
                    self.phase = MatchPhase::RoundEnd;
                    self.phase_timer = ROUND_END_FRAMES;
                    events.push(SimEvent::RoundEnd {
                        round: self.round,
                        winner: self.round_winner.map(|i| self.bot_ids[i].clone()),
                        frame,
                    });
                }
            }
            MatchPhase::RoundEnd => {
                self.phase_timer = self.phase_timer.saturating_sub(1);
                if self.phase_timer == 0 {
                    self.finish_round(&mut events);
                }
            }
            MatchPhase::MatchEnd => {}
        }

        self.frame += 1;
        events
    }

    fn tick_fighting(&mut self, inputs: &[FighterInput; 2], events: &mut Vec<SimEvent>) {
        let frame = self.frame;
        let dt = 1.0 / self.config.tick_rate as f32;

        let (x0, x1) = (self.fighters[0].x, self.fighters[1].x);
        self.fighters[0].face_toward(x1);
        self.fighters[1].face_toward(x0);
        self.fighters[0].apply_input(&inputs[0], frame);
        self.fighters[1].apply_input(&inputs[1], frame);

        for i in 0..2 {
            let dir = if Self::steerable(self.fighters[i].state) {
                (inputs[i].right as i32 - inputs[i].left as i32) as f32
            } else {
                0.0
            };
            self.fighters[i].integrate(dir, dt, frame);
        }

        // Both hit checks read the same pre-hit state so trades resolve
        // independently, then both are applied.
        let hit_a = self.compute_hit(0, 1);
        let hit_b = self.compute_hit(1, 0);
        if let Some(hit) = hit_a {
            self.apply_hit(0, 1, hit, events);
        }
        if let Some(hit) = hit_b {
            self.apply_hit(1, 0, hit, events);
        }

        let p1_down = self.fighters[0].health == 0;
        let p2_down = self.fighters[1].health == 0;
        if p1_down || p2_down {
            self.phase = MatchPhase::Ko;
            self.phase_timer = KO_FREEZE_FRAMES;
            self.round_winner = match (p1_down, p2_down) {
                (false, true) => Some(0),
                (true, false) => Some(1),
                _ => None,
            };
            if let Some(w) = self.round_winner {
                self.rounds_won[w] += 1;
            }
            for (i, down) in [p1_down, p2_down].into_iter().enumerate() {
                if down {
                    events.push(SimEvent::Ko {
                        winner: self.round_winner.map(|w| self.bot_ids[w].clone()),
                        loser: self.bot_ids[i].clone(),
                        round: self.round,
                        frame,
                    });
                }
            }
            return;
        }

        for fighter in &mut self.fighters {
            fighter.tick_state(frame);
        }

        self.timer_frames = self.timer_frames.saturating_sub(1);
        if self.timer_frames == 0 {
            self.phase = MatchPhase::Timeout;
            self.phase_timer = KO_FREEZE_FRAMES;
            let (h0, h1) = (self.fighters[0].health, self.fighters[1].health);
            self.round_winner = if h0 > h1 {
                Some(0)
            } else if h1 > h0 {
                Some(1)
            } else {
                None
            };
            if let Some(w) = self.round_winner {
                self.rounds_won[w] += 1;
            }
            events.push(SimEvent::Timeout {
                round: self.round,
                winner: self.round_winner.map(|i| self.bot_ids[i].clone()),
                frame,
            });
        }
    }

    /// States in which held horizontal input steers the fighter.
    fn steerable(state: FighterState) -> bool {
        matches!(
            state,
            FighterState::Idle
                | FighterState::Walking
                | FighterState::Running
                | FighterState::Jumping
                | FighterState::Falling
                | FighterState::Attacking
        )
    }

    fn compute_hit(&self, att: usize, def: usize) -> Option<HitResolution> {
        let attacker = &self.fighters[att];
        let defender = &self.fighters[def];

        if attacker.has_hit {
            return None;
        }
        let hitbox = attacker.hitbox()?;
        let kind = attacker.current_attack?;
        if !defender.is_vulnerable() {
            return None;
        }
        if !hitbox.intersects(&defender.hurtbox()) {
            return None;
        }

        let i = kind.index();
        let combo_index = if attacker.combo_count > 0
            && self.frame.saturating_sub(attacker.last_hit_frame) <= COMBO_WINDOW_FRAMES
        {
            attacker.combo_count + 1
        } else {
            1
        };

        let mut damage = BASE_DAMAGE[i] as f32;
        if combo_index > COMBO_SCALING_START {
            let scale = COMBO_DAMAGE_FACTOR
                .powi((combo_index - COMBO_SCALING_START) as i32)
                .max(COMBO_DAMAGE_FLOOR);
            damage *= scale;
        }

        let counter_hit = defender.state == FighterState::Attacking
            && matches!(
                defender.attack_phase,
                AttackPhase::Startup | AttackPhase::Recovery
            );
        if counter_hit {
            damage *= COUNTER_HIT_MULTIPLIER;
        }

        let sign = if attacker.x <= defender.x { 1.0 } else { -1.0 };

        Some(HitResolution {
            kind,
            damage: (damage.round() as i32).max(1),
            combo_index,
            counter_hit,
            knockback_x: sign * KNOCKBACK_X[i],
            knockback_y: KNOCKBACK_Y[i],
            hitstun: HITSTUN_FRAMES[i],
            knockdown: CAUSES_KNOCKDOWN[i],
        })
    }

    fn apply_hit(
        &mut self,
        att: usize,
        def: usize,
        hit: HitResolution,
        events: &mut Vec<SimEvent>,
    ) {
        let frame = self.frame;
        {
            let attacker = &mut self.fighters[att];
            attacker.has_hit = true;
            attacker.combo_count = hit.combo_index;
            attacker.last_hit_frame = frame;
            attacker.magic = (attacker.magic + MAGIC_GAIN_ON_HIT).min(attacker.max_magic);
        }

        self.fighters[def].take_hit(
            hit.damage,
            hit.knockback_x,
            hit.knockback_y,
            hit.hitstun,
            hit.knockdown,
            frame,
        );

        if hit.knockdown {
            // A knockdown ends the combo.
            self.fighters[att].combo_count = 0;
        }

        events.push(SimEvent::Damage {
            attacker: self.bot_ids[att].clone(),
            defender: self.bot_ids[def].clone(),
            attack: hit.kind,
            damage: hit.damage,
            is_combo: hit.combo_index > 1,
            combo_index: hit.combo_index,
            counter_hit: hit.counter_hit,
            defender_health: self.fighters[def].health,
            frame,
        });
    }

    fn finish_round(&mut self, events: &mut Vec<SimEvent>) {
        let target = self.config.rounds_to_win;
        let decided = self.rounds_won[0] >= target
            || self.rounds_won[1] >= target
            || self.round >= self.max_rounds;

        if decided {
            self.phase = MatchPhase::MatchEnd;
            self.winner = if self.rounds_won[0] > self.rounds_won[1] {
                Some(0)
            } else if self.rounds_won[1] > self.rounds_won[0] {
                Some(1)
            } else {
                None
            };
            events.push(SimEvent::MatchEnd {
                winner: self.winner.map(|i| self.bot_ids[i].clone()),
                p1_rounds: self.rounds_won[0],
                p2_rounds: self.rounds_won[1],
                frame: self.frame,
            });
        } else {
            self.round += 1;
            self.round_winner = None;
            for (i, fighter) in self.fighters.iter_mut().enumerate() {
                fighter.reset_for_round(i, self.frame);
            }
            self.timer_frames = self.config.round_seconds * self.config.tick_rate;
            self.phase = MatchPhase::Countdown;
            self.phase_timer = COUNTDOWN_FRAMES;
        }
    }

    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            match_id: self.match_id.clone(),
            frame: self.frame,
            phase: self.phase,
            round: self.round,
            p1_rounds_won: self.rounds_won[0],
            p2_rounds_won: self.rounds_won[1],
            time_remaining: self.time_remaining(),
            p1: self.fighters[0].snapshot(),
            p2: self.fighters[1].snapshot(),
            winner: self.winner.map(|i| self.bot_ids[i].clone()),
        }
    }

    /// Build the per-frame observation for one side. The decision deadline is
    /// stamped by the match runtime before the observation is pushed.
    pub fn observation(&self, side: PlayerSide) -> Observation {
        let me = &self.fighters[side.index()];
        let opp = &self.fighters[1 - side.index()];
        let distance_x = (opp.x - me.x).abs();
        let distance_y = (opp.y - me.y).abs();

        Observation {
            frame: self.frame,
            round: self.round,
            my_rounds_won: self.rounds_won[side.index()],
            opp_rounds_won: self.rounds_won[1 - side.index()],
            time_remaining: self.time_remaining(),
            you: SelfView {
                health: me.health,
                health_percent: me.health as f32 / me.max_health as f32 * 100.0,
                magic: me.magic,
                magic_percent: me.magic as f32 / me.max_magic as f32 * 100.0,
                x: me.x,
                y: me.y,
                vx: me.vx,
                vy: me.vy,
                state: me.state,
                facing: me.facing,
                grounded: me.grounded,
                can_act: me.can_act,
                combo_count: me.combo_count,
            },
            opponent: OpponentView {
                health: opp.health,
                health_percent: opp.health as f32 / opp.max_health as f32 * 100.0,
                x: opp.x,
                y: opp.y,
                state: opp.state,
                facing: opp.facing,
                attacking: opp.is_attacking(),
                blocking: opp.state == FighterState::Blocking,
                vulnerable: opp.is_vulnerable(),
                grounded: opp.grounded,
            },
            distance_x,
            distance_y,
            in_normal_range: distance_x <= NORMAL_ATTACK_RANGE,
            in_special_range: distance_x <= SPECIAL_ATTACK_RANGE,
            valid_actions: Self::valid_actions(me),
            decision_deadline_ms: 0,
        }
    }

    fn valid_actions(fighter: &Fighter) -> Vec<String> {
        if !fighter.can_act {
            return Vec::new();
        }
        let mut actions = vec![
            "left".to_string(),
            "right".to_string(),
            "attack1".to_string(),
            "attack2".to_string(),
        ];
        if fighter.grounded {
            actions.push("jump".to_string());
            actions.push("block".to_string());
        }
        if fighter.magic >= SPECIAL_MAGIC_COST {
            actions.push("special".to_string());
        }
        actions
    }
}
