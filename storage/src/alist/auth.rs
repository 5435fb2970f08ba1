use std::time::{Duration, Instant};

/// 认证相关的错误码, 含 Alist 自定义的 40140116
const AUTH_ERROR_CODES: [i64; 3] = [40140116, 401, 403];

const AUTH_ERROR_MARKERS: [&str; 7] = [
    "40140116",
    "no auth",
    "unauthorized",
    "authentication failed",
    "token is invalidated",
    "token expired",
    "invalid token",
];

/// 连续失败达到该次数后进入冷却
const COOLDOWN_THRESHOLD: u32 = 5;

pub fn is_auth_error_code(code: i64) -> bool {
    AUTH_ERROR_CODES.contains(&code)
}

pub fn is_auth_error_message(message: &str) -> bool {
    AUTH_ERROR_MARKERS.iter().any(|m| message.contains(m))
}

pub fn is_auth_error(code: i64, message: &str) -> bool {
    is_auth_error_code(code) || is_auth_error_message(message)
}

/// 指数退避: min(2^failures, 64) 秒封顶 60 秒, 带 ±25% 抖动
pub fn calculate_backoff(failure_count: u32) -> Duration {
    if failure_count == 0 {
        return Duration::ZERO;
    }

    let base_secs = 1u64 << failure_count.min(6);
    let base = Duration::from_secs(base_secs.min(60));

    let jitter_range = base.as_secs_f64() * 0.25;
    let jitter = jitter_range * (2.0 * rand::random::<f64>() - 1.0);
    let result = base.as_secs_f64() + jitter;
    if result <= 0.0 {
        base
    } else {
        Duration::from_secs_f64(result)
    }
}

/// 认证状态机: Unauthenticated / Authenticated / Cooldown
///
/// 仅在持有认证互斥锁时修改, 保证同一驱动实例的认证流程串行。
#[derive(Debug)]
pub struct AuthState {
    pub authenticated: bool,
    pub consecutive_failures: u32,
    pub last_attempt: Option<Instant>,
    pub cooldown_until: Option<Instant>,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            authenticated: false,
            consecutive_failures: 0,
            last_attempt: None,
            cooldown_until: None,
        }
    }

    /// 处于冷却期时返回剩余时长
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        match self.cooldown_until {
            Some(until) if now < until => Some(until - now),
            _ => None,
        }
    }

    pub fn record_success(&mut self) {
        self.authenticated = true;
        self.consecutive_failures = 0;
        self.cooldown_until = None;
    }

    pub fn record_failure(&mut self, now: Instant) -> Option<Duration> {
        self.consecutive_failures += 1;
        self.authenticated = false;

        if self.consecutive_failures >= COOLDOWN_THRESHOLD {
            let cooldown =
                Duration::from_secs(60 * 5) * (self.consecutive_failures - COOLDOWN_THRESHOLD + 1);
            self.cooldown_until = Some(now + cooldown);
            return Some(cooldown);
        }
        None
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}
