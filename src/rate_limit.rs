/// Rate limiting
use crate::{
    auth::extract_bearer_token,
    config::RateLimitConfig,
    context::AppContext,
    error::{ApiError, ApiResult},
    metrics,
};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter as GovernorLimiter,
};
use std::{
    hash::Hash,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};

type KeyedLimiter<K> = GovernorLimiter<K, DefaultKeyedStateStore<K>, DefaultClock>;

pub const LOGIN_PATH: &str = "/api/application/login";

/// Keys kept per limiter before idle entries are dropped
const MAX_TRACKED_KEYS: usize = 10_000;

/// Rate limiter manager
///
/// Anonymous and login traffic is keyed by client address, bearer traffic
/// by the verified caller's login.
#[derive(Clone)]
pub struct RateLimiter {
    anonymous: Arc<KeyedLimiter<IpAddr>>,
    authenticated: Arc<KeyedLimiter<String>>,
    login: Arc<KeyedLimiter<IpAddr>>,
    clock: DefaultClock,
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let anonymous_quota = Quota::per_second(non_zero(config.anonymous_rps));
        let authenticated_quota = Quota::per_second(non_zero(config.authenticated_rps));
        let login_quota = Quota::per_minute(non_zero(config.login_per_minute));

        Self {
            anonymous: Arc::new(GovernorLimiter::keyed(anonymous_quota)),
            authenticated: Arc::new(GovernorLimiter::keyed(authenticated_quota)),
            login: Arc::new(GovernorLimiter::keyed(login_quota)),
            clock: DefaultClock::default(),
        }
    }

    fn check<K: Hash + Eq + Clone>(
        &self,
        limiter: &KeyedLimiter<K>,
        key: &K,
        scope: &'static str,
    ) -> ApiResult<()> {
        if limiter.len() > MAX_TRACKED_KEYS {
            limiter.retain_recent();
        }

        limiter.check_key(key).map_err(|not_until| {
            metrics::record_rate_limited(scope);
            ApiError::RateLimitExceeded {
                retry_after: not_until.wait_time_from(self.clock.now()),
            }
        })
    }

    pub fn check_anonymous(&self, client: IpAddr) -> ApiResult<()> {
        self.check(&self.anonymous, &client, "anonymous")
    }

    pub fn check_authenticated(&self, login: &str) -> ApiResult<()> {
        self.check(&self.authenticated, &login.to_string(), "authenticated")
    }

    pub fn check_login(&self, client: IpAddr) -> ApiResult<()> {
        self.check(&self.login, &client, "login")
    }
}

/// Peer address, when the server was started with connect info
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Rate limiting middleware for the account API
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !ctx.config.rate_limit.enabled {
        return Ok(next.run(request).await);
    }

    let client = client_ip(&request);

    if request.method() == Method::POST && request.uri().path() == LOGIN_PATH {
        ctx.rate_limiter.check_login(client)?;
    }

    // Only a token that verifies moves a request out of the anonymous bucket
    let caller = extract_bearer_token(request.headers())
        .and_then(|token| ctx.token_issuer.verify(token).ok());

    match caller {
        Some(caller) => ctx.rate_limiter.check_authenticated(&caller.login)?,
        None => ctx.rate_limiter.check_anonymous(client)?,
    }

    Ok(next.run(request).await)
}
