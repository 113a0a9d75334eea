//! JWK set endpoint.

use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use time::OffsetDateTime;

use super::IdpState;

const MIN_MAX_AGE: i64 = 60;
const MAX_MAX_AGE: i64 = 86_400;

/// Handler for `GET /keys`.
///
/// Clients may cache the set until the active key stops signing, clamped
/// to between one minute and one day.
pub async fn keys_handler(State(state): State<IdpState>) -> Response {
    let keys = state.server.keys();
    let max_age = cache_max_age(keys.active_valid_until(), OffsetDateTime::now_utc());

    (
        [(
            header::CACHE_CONTROL,
            format!("public, max-age={max_age}"),
        )],
        Json(keys.jwks()),
    )
        .into_response()
}

fn cache_max_age(valid_until: Option<OffsetDateTime>, now: OffsetDateTime) -> i64 {
    valid_until
        .map(|until| (until - now).whole_seconds())
        .unwrap_or(MIN_MAX_AGE)
        .clamp(MIN_MAX_AGE, MAX_MAX_AGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_max_age_clamped() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(cache_max_age(None, now), 60);
        assert_eq!(cache_max_age(Some(now + Duration::seconds(5)), now), 60);
        assert_eq!(cache_max_age(Some(now - Duration::hours(1)), now), 60);
        assert_eq!(cache_max_age(Some(now + Duration::hours(6)), now), 21_600);
        assert_eq!(cache_max_age(Some(now + Duration::days(3)), now), 86_400);
    }
}
