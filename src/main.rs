// src/main.rs

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use handbeat_core::audio::{AudioSink, SilentSink, open_output};
use handbeat_core::clock::{MonotonicClock, SharedClock};
use handbeat_core::config::GameConfig;
use handbeat_core::game::{Game, GameEvent};
use handbeat_core::gesture::{DetectorChain, GesturePipeline, PhaseCell, spawn_pipeline};
use handbeat_core::judge::{HttpVisionJudge, Judgment, RoundStatus};
use handbeat_core::scheduler::spawn_scheduler;
use handbeat_core::sim::{PoseControl, SyntheticCamera, default_chain};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

fn load_config() -> anyhow::Result<GameConfig> {
    let args: Vec<String> = std::env::args().collect();
    match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).ok_or_else(|| anyhow::anyhow!("--config needs a path"))?;
            Ok(GameConfig::load_from_disk(path)?)
        }
        None => Ok(GameConfig::default()),
    }
}

fn print_event(ev: &GameEvent) {
    match ev {
        GameEvent::Countdown { beats_left } => print!("\r\n⏳ {beats_left}..."),
        GameEvent::Beat { position, target, detected, judgment } => {
            let mark = if *judgment == Judgment::Hit { "✅" } else { "❌" };
            let seen = detected.map_or("-".to_string(), |d| d.to_string());
            print!("\r\n{mark} beat {} wanted {target}, saw {seen}", position + 1);
        }
        GameEvent::Analyzing => print!("\r\n🧠 Asking the vision judge..."),
        GameEvent::Degraded { reason } => print!("\r\nℹ️ Using local judgment ({reason})"),
        GameEvent::Verdict { verdict, .. } => {
            let word = if verdict.success { "PASS" } else { "FAIL" };
            print!("\r\n🏁 {word}: {} / 100, {}", verdict.score, verdict.feedback);
            print!("\r\n[R] Replay | [N] Next round | [Q] Back to menu");
        }
        GameEvent::NextRound { round, bpm } => print!("\r\n🔥 Round {round} at {bpm:.0} BPM"),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = load_config()?;

    // 1. Audio: keep the stream on this thread, hand the sink to the scheduler.
    let (_output, sink, clock) = match open_output() {
        Ok((output, sink, clock)) => {
            let sink: Box<dyn AudioSink> = Box::new(sink);
            let clock: SharedClock = Arc::new(clock);
            (Some(output), sink, clock)
        }
        Err(e) => {
            log::warn!("⚠️ {} - continuing without sound", e);
            let sink: Box<dyn AudioSink> = Box::new(SilentSink);
            let clock: SharedClock = Arc::new(MonotonicClock::new());
            (None, sink, clock)
        }
    };
    let scheduler = spawn_scheduler(&config.scheduler, clock.clone(), sink);

    // 2. Camera + detector chain.
    let pose = PoseControl::new(None);
    let phase = PhaseCell::new();
    let chain = DetectorChain::new(
        default_chain(&pose, config.gesture.aspect_ratio),
        Duration::from_millis(config.gesture.worker_timeout_ms),
    );
    let pipeline = GesturePipeline::new(config.gesture.clone(), chain, phase.clone(), clock.clone());
    let camera = SyntheticCamera::new(pose.clone(), 160, 120).with_frame_interval(Duration::from_millis(16));
    let mut capture = spawn_pipeline(pipeline, Box::new(camera))?;

    let snapshots = capture.snapshots();
    snapshots.on_count_change(|_, snap| log::debug!("count now {:?}", snap.smoothed_count));

    // 3. Game.
    let seed = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map_or(0, |d| d.as_nanos() as u64);
    let mut game = Game::new(config.clone(), scheduler, snapshots, phase, clock.clone(), seed);
    if let Some(url) = config.judge.remote_url.as_deref() {
        let remote = HttpVisionJudge::new(url, Duration::from_millis(config.judge.remote_timeout_ms))?;
        game = game.with_remote(Arc::new(remote))?;
    }

    println!("✋ handbeat: show the number of fingers on the beat.");
    println!("[S] Start | [0-5] Show fingers | [H] Hide hand | [Q] Quit");

    enable_raw_mode()?;

    let frame = Duration::from_millis(16);
    let mut last_status = game.status();

    loop {
        if event::poll(frame)? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind == KeyEventKind::Press {
                    if ev.code == KeyCode::Char('c') && ev.modifiers.contains(KeyModifiers::CONTROL) {
                        break;
                    }
                    let result = match ev.code {
                        KeyCode::Char(c @ '0'..='5') => {
                            pose.set(c.to_digit(10).map(|d| d as u8));
                            Ok(())
                        }
                        KeyCode::Char('h') => {
                            pose.set(None);
                            Ok(())
                        }
                        KeyCode::Char('s') if game.status() == RoundStatus::Idle => game.start(),
                        KeyCode::Char('r') if game.status() == RoundStatus::Result => game.replay(),
                        KeyCode::Char('n') if game.status() == RoundStatus::Result => game.next_round(),
                        KeyCode::Char('q') if game.status() == RoundStatus::Result => game.exit(),
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        _ => Ok(()),
                    };
                    if let Err(e) = result {
                        print!("\r\n❌ {e}");
                    }
                }
            }
        }

        for ev in game.update()? {
            print_event(&ev);
        }

        if game.status() != last_status {
            last_status = game.status();
            if last_status == RoundStatus::Countdown {
                let s = game.session();
                print!("\r\n🎬 Round {}: {:?} at {:.0} BPM", s.round, s.sequence, s.bpm);
            }
        }
        std::io::stdout().flush()?;
    }

    disable_raw_mode()?;
    capture.stop();
    println!("\n🛑 Exiting handbeat.");
    Ok(())
}
