// author: kodeholic (powered by Claude)
// 논리 시계 드라이버 태스크
//
// 주기마다 수행:
//   1. 시작 시점 대비 경과 wall-clock(ms) 계산
//   2. 공유 FloorServer를 (기준 시각 + 경과)까지 advance_to
//   3. 발언 중인 호 수가 바뀌면 로그
//
// Floor 엔진 자체는 논리 시계만 알고, wall-clock 연결은 이 태스크만 담당.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{info, trace};

use crate::server::FloorServer;

pub type SharedServer = Arc<Mutex<FloorServer>>;

/// poison 이후에도 상태는 일관 — 잠금 그대로 회수
pub fn lock_server(server: &SharedServer) -> MutexGuard<'_, FloorServer> {
    match server.lock() {
        Ok(guard)     => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub async fn run_clock(server: SharedServer, tick_ms: u64) {
    let base      = lock_server(&server).now();
    let started   = Instant::now();
    let mut timer = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    timer.tick().await; // 첫 틱 즉시 반환 — skip

    info!("[floor-clock] Started (tick={}ms, base={}ms)", tick_ms, base);

    let mut last_taken = 0;
    loop {
        timer.tick().await;

        let elapsed = started.elapsed().as_millis() as u64;
        let taken = {
            let mut guard = lock_server(&server);
            guard.advance_to(base + elapsed);
            guard.count_floor_taken()
        };
        trace!("[floor-clock] now={}ms", base + elapsed);

        if taken != last_taken {
            info!("[floor-clock] calls with floor taken: {} → {}", last_taken, taken);
            last_taken = taken;
        }
    }
}

pub fn spawn_clock(server: SharedServer, tick_ms: u64) -> JoinHandle<()> {
    tokio::spawn(run_clock(server, tick_ms))
}
