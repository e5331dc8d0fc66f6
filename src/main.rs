// author: kodeholic (powered by Claude)
//
// floorsim — MBCP Floor Control 시나리오 시뮬레이터
//
// 사용법:
//   floorsim [--config FILE] [--link-delay MS] [--filter KW] [--json] [--realtime] <SCENARIO>
//
// 예시:
//   floorsim preempt                  # 일반 발언 중 높은 priority 선점
//   floorsim queue                    # 동일 priority 3명 → 대기열 순차 Grant
//   floorsim max-duration             # T2 만료 Revoke → 대기열 Grant 미수락(T132)
//   floorsim broadcast                # Broadcast 착신자 로컬 Deny
//   floorsim dual                     # Dual Floor 보조 발언 + 승격
//   floorsim queue --link-delay 20 --filter msg
//   RUST_LOG=trace floorsim preempt   # 엔진 내부 로그 포함

use std::process;
use std::sync::{Arc, Mutex};

use clap::{Parser, ValueEnum};
use colored::Colorize;
use tabled::{Table, Tabled};
use tokio::sync::broadcast::Receiver;
use tokio::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use mcptt_floor::config::{self, SessionConfig};
use mcptt_floor::driver::{self, SharedServer};
use mcptt_floor::trace::FloorEvent;
use mcptt_floor::{CallId, CallSession, CallType, FloorError, FloorIndicator, FloorMsg, FloorResult, FloorServer, Priority, Ssrc, TraceEvent, TraceHub};

// ----------------------------------------------------------------------------
// [CLI 인자]
// ----------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name    = "floorsim",
    about   = "MBCP Floor Control 시나리오 시뮬레이터 (논리 시계)",
    version,
)]
struct Cli {
    /// 실행할 시나리오
    #[arg(value_enum)]
    scenario: ScenarioKind,

    /// SessionConfig JSON 파일 (누락 필드는 기본값)
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// 메시지 전달 지연 (ms) — 설정 파일 값보다 우선
    #[arg(long)]
    link_delay: Option<u64>,

    /// 이벤트 필터 키워드 (예: msg, state, grant). 대소문자 무관
    #[arg(long, short = 'f')]
    filter: Option<String>,

    /// 이벤트를 JSON 한 줄씩 출력
    #[arg(long)]
    json: bool,

    /// wall-clock 드라이버로 실제 시간에 맞춰 진행
    #[arg(long)]
    realtime: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScenarioKind {
    Preempt,
    Queue,
    MaxDuration,
    Broadcast,
    Dual,
}

// ----------------------------------------------------------------------------
// [시나리오 정의]
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
enum Action {
    Push(Ssrc),
    Release(Ssrc),
    Accept(Ssrc),
    QueuePosition(Ssrc),
    Dual(Ssrc),
    Emergency(Ssrc),
    Leave(Ssrc),
}

struct Scenario {
    call_type: CallType,
    /// (ssrc, priority, originator)
    parties:   Vec<(Ssrc, Priority, bool)>,
    steps:     Vec<(u64, Action)>,
    until:     u64,
    config:    SessionConfig,
}

fn build_scenario(kind: ScenarioKind, mut config: SessionConfig) -> Scenario {
    use Action::*;
    match kind {
        ScenarioKind::Preempt => Scenario {
            call_type: CallType::Basic,
            parties:   vec![(100, 3, true), (200, 5, false), (300, 1, false)],
            steps:     vec![(0, Emergency(200)), (0, Push(100)), (200, Push(200)), (1_500, Release(200))],
            until:     2_000,
            config,
        },
        ScenarioKind::Queue => Scenario {
            call_type: CallType::Basic,
            parties:   vec![(100, 3, true), (200, 3, false), (300, 3, false)],
            steps:     vec![
                (0, Push(100)), (10, Push(200)), (20, Push(300)),
                (100, QueuePosition(300)),
                (500, Release(100)), (600, Accept(200)),
                (900, Release(200)),
            ],
            until:     4_000,
            config,
        },
        ScenarioKind::MaxDuration => {
            config.arbitrator.t2_ms = 1_000;
            Scenario {
                call_type: CallType::Basic,
                parties:   vec![(100, 1, true), (200, 1, false), (300, 1, false)],
                // 100: T2 Revoke → Release. 200: 대기열 Grant 미수락 → T132 Release. 300: 이탈
                steps:     vec![(0, Push(100)), (10, Push(200)), (20, Leave(300))],
                until:     4_000,
                config,
            }
        }
        ScenarioKind::Broadcast => Scenario {
            call_type: CallType::Broadcast,
            parties:   vec![(100, 1, true), (200, 1, false)],
            steps:     vec![(0, Push(200)), (10, Push(100)), (500, Release(100))],
            until:     1_000,
            config,
        },
        ScenarioKind::Dual => {
            config.arbitrator.dual_floor_supported = true;
            config.arbitrator.ack_required = true;
            Scenario {
                call_type: CallType::Basic,
                parties:   vec![(100, 1, true), (200, 9, false), (300, 1, false)],
                steps:     vec![(0, Push(100)), (0, Dual(200)), (100, Push(200)), (400, Release(100)), (800, Release(200))],
                until:     1_500,
                config,
            }
        }
    }
}

fn apply(call: &mut CallSession, action: Action) -> FloorResult<()> {
    match action {
        Action::Push(ssrc)          => call.ptt_push(ssrc),
        Action::Release(ssrc)       => call.ptt_release(ssrc),
        Action::Accept(ssrc)        => call.accept_grant(ssrc),
        Action::QueuePosition(ssrc) => call.queue_position_request(ssrc),
        Action::Dual(ssrc)          => call.set_dual_floor(ssrc, true),
        Action::Emergency(ssrc)     => call.set_indicator(ssrc, Some(FloorIndicator::Emergency)),
        Action::Leave(ssrc)         => call.client_release(ssrc),
    }
}

fn setup_call(server: &mut FloorServer, scenario: &Scenario) -> FloorResult<CallId> {
    let call_id = server.create_call(scenario.call_type)?;
    let call = server.call_mut(call_id)?;
    for &(ssrc, priority, originator) in &scenario.parties {
        call.join(ssrc, priority, originator)?;
    }
    call.initialize_all()?;
    call.run_until_idle();
    Ok(call_id)
}

/// 논리 시계로 즉시 진행
fn run_logical(server: &mut FloorServer, call_id: CallId, scenario: &Scenario) -> FloorResult<()> {
    for &(at, action) in &scenario.steps {
        server.advance_to(at);
        apply(server.call_mut(call_id)?, action)?;
        server.advance_by(0);
    }
    server.advance_to(scenario.until);
    Ok(())
}

/// wall-clock 드라이버와 함께 진행
async fn run_realtime(shared: SharedServer, call_id: CallId, scenario: &Scenario) -> FloorResult<()> {
    let handle  = driver::spawn_clock(Arc::clone(&shared), config::DRIVER_TICK_MS);
    let started = Instant::now();

    for &(at, action) in &scenario.steps {
        tokio::time::sleep_until(started + Duration::from_millis(at)).await;
        let mut guard = driver::lock_server(&shared);
        guard.advance_to(at);
        apply(guard.call_mut(call_id)?, action)?;
        guard.advance_by(0);
    }
    tokio::time::sleep_until(started + Duration::from_millis(scenario.until)).await;
    driver::lock_server(&shared).advance_to(scenario.until);
    handle.abort();
    Ok(())
}

// ----------------------------------------------------------------------------
// [메인]
// ----------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // 기본값: warn (엔진 내부 로그는 RUST_LOG로)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "✗".red(), e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> FloorResult<()> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None       => SessionConfig::default(),
    };
    if let Some(delay) = cli.link_delay {
        config.link_delay_ms = delay;
    }

    let scenario = build_scenario(cli.scenario, config);
    let hub = TraceHub::new();
    let mut rx = hub.subscribe();

    let mut server = FloorServer::new(scenario.config.clone());
    server.subscribe(hub.clone());
    let call_id = setup_call(&mut server, &scenario)?;

    print_header(&cli, call_id, &scenario);

    let shared: SharedServer = Arc::new(Mutex::new(server));
    if cli.realtime {
        run_realtime(Arc::clone(&shared), call_id, &scenario).await?;
    } else {
        run_logical(&mut driver::lock_server(&shared), call_id, &scenario)?;
    }
    let mut server = driver::lock_server(&shared);

    let filter = cli.filter.as_ref().map(|s| s.to_lowercase());
    let shown = drain_events(&mut rx, filter.as_deref(), cli.json);

    println!("{}", "─".repeat(90).dimmed());
    print_summary(server.call(call_id)?);
    println!("  {} events shown, holder={}", shown,
        server.call(call_id)?.holder().map(|s| s.to_string()).unwrap_or_else(|| "-".into()));

    server.release_call(call_id)?;
    Ok(())
}

fn load_config(path: &str) -> FloorResult<SessionConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| FloorError::ConfigError(format!("{}: {}", path, e)))?;
    SessionConfig::from_json(&text)
}

// ----------------------------------------------------------------------------
// [출력]
// ----------------------------------------------------------------------------

fn print_header(cli: &Cli, call_id: CallId, scenario: &Scenario) {
    println!("{}", "─".repeat(90).dimmed());
    println!(
        "  {} {}  call={} type={} parties={} link_delay={}ms {}",
        "floorsim".bold().cyan(),
        "▶".green(),
        call_id,
        scenario.call_type,
        scenario.parties.len(),
        scenario.config.link_delay_ms,
        if cli.realtime { "[realtime]".yellow().to_string() } else { String::new() },
    );
    println!("{}", "─".repeat(90).dimmed());
}

fn drain_events(rx: &mut Receiver<TraceEvent>, filter: Option<&str>, json: bool) -> usize {
    let mut shown = 0;
    while let Ok(event) = rx.try_recv() {
        let kind = event_kind(&event.event);
        if let Some(f) = filter {
            if !kind.to_lowercase().contains(f) {
                continue;
            }
        }
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e)   => eprintln!("{} JSON 직렬화 실패: {}", "⚠".yellow(), e),
            }
        } else {
            print_event(&event, kind);
        }
        shown += 1;
    }
    shown
}

fn event_kind(event: &FloorEvent) -> &'static str {
    match event {
        FloorEvent::StateChanged { .. } => "STATE",
        FloorEvent::MessageSent { .. }  => "MSG",
        FloorEvent::FloorGranted { .. } => "GRANT",
        FloorEvent::GrantPending { .. } => "PENDING",
        FloorEvent::FloorDenied { .. }  => "DENY",
        FloorEvent::FloorRevoked { .. } => "REVOKE",
        FloorEvent::Failure { .. }      => "FAIL",
        FloorEvent::CallReleased { .. } => "END",
    }
}

fn print_event(e: &TraceEvent, kind: &str) {
    let ts = format!("{:>7}ms", e.ts);
    let kind_str = match kind {
        "MSG"               => kind.bright_blue().to_string(),
        "STATE"             => kind.bright_yellow().to_string(),
        "GRANT" | "PENDING" => kind.bright_green().bold().to_string(),
        "DENY" | "REVOKE"   => kind.bright_red().bold().to_string(),
        "FAIL"              => kind.red().bold().to_string(),
        other               => other.bright_magenta().to_string(),
    };

    let detail = match &e.event {
        FloorEvent::MessageSent { from, to, msg, .. } => {
            format!("{:>10} → {:<10} {}", from.to_string(), to.to_string(), colorize_msg(msg))
        }
        FloorEvent::StateChanged { ssrc, from, to, .. } => {
            format!("{:>10}   {} → {}", ssrc, from.dimmed(), to)
        }
        FloorEvent::FloorGranted { ssrc, .. } | FloorEvent::GrantPending { ssrc, .. } => format!("{:>10}", ssrc),
        FloorEvent::FloorDenied { ssrc, cause, local, .. } => {
            format!("{:>10}   {}{}", ssrc, cause, if *local { " (local)" } else { "" })
        }
        FloorEvent::FloorRevoked { ssrc, cause, .. } => format!("{:>10}   {}", ssrc, cause),
        FloorEvent::Failure { ssrc, kind, .. }       => format!("{:>10}   {:?}", ssrc, kind),
        FloorEvent::CallReleased { call_id }         => format!("call={}", call_id),
    };

    println!("  {} {:<8} {}", ts.dimmed(), kind_str, detail);
}

fn colorize_msg(msg: &FloorMsg) -> String {
    let label = msg.label();
    match msg {
        FloorMsg::Granted(_)                 => label.bright_green().bold().to_string(),
        FloorMsg::Revoke(_) | FloorMsg::Denied(_) => label.bright_red().bold().to_string(),
        FloorMsg::Request(_) | FloorMsg::Release(_) => label.bright_white().to_string(),
        FloorMsg::Ack(_)                     => label.dimmed().to_string(),
        _                                    => label.normal().to_string(),
    }
}

#[derive(Tabled)]
struct PartyRow {
    #[tabled(rename = "SSRC")]
    ssrc:     Ssrc,
    #[tabled(rename = "PRI")]
    priority: Priority,
    #[tabled(rename = "STATE")]
    state:    &'static str,
    #[tabled(rename = "TALKER")]
    talker:   String,
    #[tabled(rename = "QUEUE")]
    queue:    String,
}

fn print_summary(call: &CallSession) {
    let rows: Vec<PartyRow> = call.participants().map(|p| PartyRow {
        ssrc:     p.ssrc(),
        priority: p.priority(),
        state:    p.state().name(),
        talker:   p.current_talker().map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
        queue:    p.queue_position().map(|n| format!("#{}", n)).unwrap_or_else(|| "-".into()),
    }).collect();

    println!("  arbitrator: {}  (t={}ms)", call.arbitrator_state().name().bold(), call.now());
    println!("{}", Table::new(rows));
}
