//! Access-control gate.
//!
//! Every protected handler calls [`authorize`] before doing any work. The
//! gate resolves who is calling and then checks a [`Policy`] against what
//! the request touches:
//!
//! 1. If the route accepts API keys and one was presented, the key is
//!    resolved through the registry (unknown key → 404).
//! 2. Otherwise the login token is resolved (missing/invalid → 401).
//! 3. Admins are let through. Otherwise the policy decides: `Open` grants,
//!    `AdminOnly` denies, `SelfOrAdmin` compares account IDs and `Owner`
//!    runs an ownership predicate. A denial is 401; a predicate that cannot
//!    find the resource it needs yields 404; any other predicate failure
//!    counts as a denial.
//!
//! The resolved identity is returned in a [`RequestContext`] and handed to
//! the handler body; nothing downstream resolves it again.

use crate::error::ApiError;
use crate::extract::Credentials;
use crate::{with_conn, AppState};
use gamelytics_store::accounts::{find_account_by_token, Account};
use gamelytics_store::events::get_event;
use gamelytics_store::games::{get_game, Game};
use gamelytics_store::keys::{get_key, resolve_key, ApiKey, KeyGrant};
use gamelytics_store::sessions::{belongs_to, get_session, Session};
use gamelytics_store::{EventScope, StoreError};
use rusqlite::Connection;

/// A caller authenticated with a login token.
#[derive(Debug, Clone)]
pub struct AccountIdentity {
    pub account: Account,
}

/// A caller authenticated with a per-game API key.
#[derive(Debug, Clone)]
pub struct ApiKeyIdentity {
    pub key: ApiKey,
    /// The account that issued the key.
    pub account: Account,
    /// The game the key is scoped to.
    pub game: Game,
}

/// Who is making the request.
#[derive(Debug, Clone)]
pub enum Identity {
    Account(AccountIdentity),
    ApiKey(ApiKeyIdentity),
}

impl Identity {
    /// The account behind the identity (for keys, the issuing account).
    pub fn account(&self) -> &Account {
        match self {
            Identity::Account(identity) => &identity.account,
            Identity::ApiKey(identity) => &identity.account,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.account().is_admin
    }

    /// The game this identity is scoped to, if it came from an API key.
    pub fn game_id(&self) -> Option<i64> {
        match self {
            Identity::Account(_) => None,
            Identity::ApiKey(identity) => Some(identity.game.id),
        }
    }

    /// Which events this identity may read.
    pub fn event_scope(&self) -> EventScope {
        match self {
            _ if self.is_admin() => EventScope::Unrestricted,
            Identity::ApiKey(identity) => EventScope::Game(identity.game.id),
            Identity::Account(identity) => EventScope::Publisher(identity.account.id),
        }
    }
}

impl From<KeyGrant> for Identity {
    fn from(grant: KeyGrant) -> Self {
        Identity::ApiKey(ApiKeyIdentity {
            key: grant.key,
            account: grant.account,
            game: grant.game,
        })
    }
}

/// Request facts a policy may need: path parameters and body fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pub account_id: Option<i64>,
    pub game_id: Option<i64>,
    pub session_id: Option<String>,
    pub event_id: Option<i64>,
    pub key: Option<String>,
}

impl Params {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn account(id: i64) -> Self {
        Self {
            account_id: Some(id),
            ..Self::default()
        }
    }

    pub fn game(id: i64) -> Self {
        Self {
            game_id: Some(id),
            ..Self::default()
        }
    }

    pub fn session(id: impl Into<String>) -> Self {
        Self {
            session_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn event(id: i64) -> Self {
        Self {
            event_id: Some(id),
            ..Self::default()
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// Ownership predicate. `Ok(false)` denies; `Err(NotFound)` becomes 404.
pub type OwnerCheck = fn(&Connection, &Identity, &Params) -> Result<bool, StoreError>;

/// Authorization policy for a route.
#[derive(Clone, Copy)]
pub enum Policy {
    /// Any resolved identity.
    Open,
    /// Admins only.
    AdminOnly,
    /// The account named by `Params::account_id`, or an admin.
    SelfOrAdmin,
    /// Whoever the predicate accepts, or an admin.
    Owner(OwnerCheck),
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::Open => f.write_str("Open"),
            Policy::AdminOnly => f.write_str("AdminOnly"),
            Policy::SelfOrAdmin => f.write_str("SelfOrAdmin"),
            Policy::Owner(_) => f.write_str("Owner"),
        }
    }
}

/// A policy plus whether API keys are accepted on the route.
#[derive(Debug, Clone, Copy)]
pub struct Guard {
    pub policy: Policy,
    pub accept_api_key: bool,
}

impl Guard {
    /// Login tokens only.
    pub const fn login(policy: Policy) -> Self {
        Self {
            policy,
            accept_api_key: false,
        }
    }

    /// API keys (preferred when present) or login tokens.
    pub const fn any(policy: Policy) -> Self {
        Self {
            policy,
            accept_api_key: true,
        }
    }
}

/// The per-request result of a successful [`authorize`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub identity: Identity,
}

/// Resolves the caller and checks `guard` against `params`.
///
/// Holds one pooled connection for the duration of the check.
///
/// # Errors
///
/// - `ApiError::Authentication` (401) for a missing or invalid login token.
/// - `ApiError::NotFound` (404) for an unknown API key or a resource the
///   policy needs.
/// - `ApiError::Authorization` (401) when the policy denies access.
pub async fn authorize(
    state: &AppState,
    credentials: Credentials,
    guard: Guard,
    params: Params,
) -> Result<RequestContext, ApiError> {
    with_conn(&state.pool, move |conn| {
        let identity = resolve_identity(conn, &credentials, guard.accept_api_key)?;
        evaluate(conn, &identity, guard.policy, &params)?;
        Ok(RequestContext { identity })
    })
    .await
}

/// Steps 1 and 2: turn raw credentials into an [`Identity`].
pub fn resolve_identity(
    conn: &Connection,
    credentials: &Credentials,
    accept_api_key: bool,
) -> Result<Identity, ApiError> {
    if accept_api_key {
        if let Some(key) = credentials.api_key.as_deref() {
            return Ok(resolve_key(conn, key)?.into());
        }
    }

    let token = credentials
        .login_token
        .as_deref()
        .ok_or_else(|| ApiError::Authentication("missing credentials".to_string()))?;
    let account = find_account_by_token(conn, token)?
        .ok_or_else(|| ApiError::Authentication("invalid or expired login token".to_string()))?;

    Ok(Identity::Account(AccountIdentity { account }))
}

/// Step 3: decide whether `identity` may proceed under `policy`.
pub fn evaluate(
    conn: &Connection,
    identity: &Identity,
    policy: Policy,
    params: &Params,
) -> Result<(), ApiError> {
    if identity.is_admin() {
        return Ok(());
    }

    let allowed = match policy {
        Policy::Open => true,
        Policy::AdminOnly => false,
        Policy::SelfOrAdmin => params.account_id == Some(identity.account().id),
        Policy::Owner(check) => match check(conn, identity, params) {
            Ok(allowed) => allowed,
            Err(e @ StoreError::NotFound { .. }) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(error = %e, ?policy, "ownership check failed, denying");
                false
            }
        },
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(
            account_id = identity.account().id,
            ?policy,
            ?params,
            "access denied"
        );
        Err(ApiError::Authorization("access denied".to_string()))
    }
}

fn account_owns_game(conn: &Connection, account: &Account, game_id: i64) -> Result<bool, StoreError> {
    Ok(get_game(conn, game_id)?.publisher_id == account.id)
}

fn identity_owns_session(
    conn: &Connection,
    identity: &Identity,
    session: &Session,
) -> Result<bool, StoreError> {
    match identity {
        Identity::ApiKey(key) => Ok(belongs_to(key.game.id, session)),
        Identity::Account(a) => account_owns_game(conn, &a.account, session.game_id),
    }
}

/// The caller publishes (or holds a key for) `Params::game_id`.
pub fn owns_game(conn: &Connection, identity: &Identity, params: &Params) -> Result<bool, StoreError> {
    let Some(game_id) = params.game_id else {
        return Ok(false);
    };
    match identity {
        Identity::ApiKey(key) => {
            get_game(conn, game_id)?;
            Ok(key.game.id == game_id)
        }
        Identity::Account(a) => account_owns_game(conn, &a.account, game_id),
    }
}

/// The session `Params::session_id` chains to the caller's game(s).
pub fn owns_session(
    conn: &Connection,
    identity: &Identity,
    params: &Params,
) -> Result<bool, StoreError> {
    let Some(session_id) = params.session_id.as_deref() else {
        return Ok(false);
    };
    let session = get_session(conn, session_id)?;
    identity_owns_session(conn, identity, &session)
}

/// The event `Params::event_id` chains to the caller's game(s).
pub fn owns_event(conn: &Connection, identity: &Identity, params: &Params) -> Result<bool, StoreError> {
    let Some(event_id) = params.event_id else {
        return Ok(false);
    };
    let event = get_event(conn, event_id)?;
    let session = get_session(conn, &event.session_id)?;
    identity_owns_session(conn, identity, &session)
}

/// The caller issued the key `Params::key`.
pub fn owns_key(conn: &Connection, identity: &Identity, params: &Params) -> Result<bool, StoreError> {
    let Some(key) = params.key.as_deref() else {
        return Ok(false);
    };
    Ok(get_key(conn, key)?.account_id == identity.account().id)
}

/// Key holders may always open a session for their own game; logged-in
/// publishers must name a game they own.
pub fn can_open_session(
    conn: &Connection,
    identity: &Identity,
    params: &Params,
) -> Result<bool, StoreError> {
    match identity {
        Identity::ApiKey(_) => Ok(true),
        Identity::Account(_) => owns_game(conn, identity, params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamelytics_store::accounts::{create_account, issue_connection_token, NewAccount};
    use gamelytics_store::games::{create_game, NewGame};
    use gamelytics_store::keys::create_key;
    use gamelytics_store::sessions::{create_session, SessionAttrs};

    struct World {
        conn: Connection,
        alice: Account,
        bob: Account,
        admin: Account,
        alice_game: i64,
        bob_game: i64,
        alice_session: String,
    }

    fn account(conn: &Connection, email: &str, is_admin: bool) -> Account {
        create_account(
            conn,
            &NewAccount {
                email: email.to_string(),
                password_hash: "x".to_string(),
                is_admin,
            },
        )
        .expect("create account")
    }

    fn world() -> World {
        let conn = Connection::open_in_memory().expect("open db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("foreign keys");
        gamelytics_db::run_migrations(&conn).expect("migrations");

        let alice = account(&conn, "alice@example.com", false);
        let bob = account(&conn, "bob@example.com", false);
        let admin = account(&conn, "admin@example.com", true);
        let new_game = |name: &str| NewGame {
            name: name.to_string(),
            ..NewGame::default()
        };
        let alice_game = create_game(&conn, alice.id, &new_game("a")).expect("game").id;
        let bob_game = create_game(&conn, bob.id, &new_game("b")).expect("game").id;
        let alice_session = create_session(&conn, alice_game, &SessionAttrs::default())
            .expect("session")
            .id;

        World {
            conn,
            alice,
            bob,
            admin,
            alice_game,
            bob_game,
            alice_session,
        }
    }

    fn login(account: &Account) -> Identity {
        Identity::Account(AccountIdentity {
            account: account.clone(),
        })
    }

    fn status(result: Result<(), ApiError>) -> u16 {
        match result {
            Ok(()) => 200,
            Err(e) => e.status().as_u16(),
        }
    }

    #[test]
    fn missing_credentials_are_unauthenticated() {
        let w = world();
        let err = resolve_identity(&w.conn, &Credentials::default(), true).expect_err("no creds");
        assert_eq!(err.status().as_u16(), 401);
    }

    #[test]
    fn stale_token_is_unauthenticated() {
        let w = world();
        let old = issue_connection_token(&w.conn, w.alice.id).expect("token");
        issue_connection_token(&w.conn, w.alice.id).expect("token");

        let creds = Credentials {
            login_token: Some(old),
            api_key: None,
        };
        let err = resolve_identity(&w.conn, &creds, false).expect_err("stale");
        assert!(matches!(err, ApiError::Authentication(_)));
    }

    #[test]
    fn unknown_key_is_not_found() {
        let w = world();
        let creds = Credentials {
            login_token: None,
            api_key: Some("nope".to_string()),
        };
        let err = resolve_identity(&w.conn, &creds, true).expect_err("unknown key");
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn key_is_ignored_on_login_only_routes() {
        let w = world();
        let key = create_key(&w.conn, "k", w.alice.id, w.alice_game).expect("key");
        let token = issue_connection_token(&w.conn, w.bob.id).expect("token");
        let creds = Credentials {
            login_token: Some(token),
            api_key: Some(key.key),
        };

        let identity = resolve_identity(&w.conn, &creds, false).expect("login identity");
        assert!(matches!(identity, Identity::Account(ref a) if a.account.id == w.bob.id));

        let identity = resolve_identity(&w.conn, &creds, true).expect("key identity");
        assert_eq!(identity.game_id(), Some(w.alice_game));
    }

    #[test]
    fn policy_decisions() {
        let w = world();
        let alice = login(&w.alice);
        let admin = login(&w.admin);

        assert_eq!(status(evaluate(&w.conn, &alice, Policy::Open, &Params::none())), 200);
        assert_eq!(status(evaluate(&w.conn, &alice, Policy::AdminOnly, &Params::none())), 401);
        assert_eq!(status(evaluate(&w.conn, &admin, Policy::AdminOnly, &Params::none())), 200);
        assert_eq!(
            status(evaluate(&w.conn, &alice, Policy::SelfOrAdmin, &Params::account(w.alice.id))),
            200
        );
        assert_eq!(
            status(evaluate(&w.conn, &alice, Policy::SelfOrAdmin, &Params::account(w.bob.id))),
            401
        );
    }

    #[test]
    fn game_ownership() {
        let w = world();
        let alice = login(&w.alice);
        let admin = login(&w.admin);
        let owner = Policy::Owner(owns_game);

        assert_eq!(status(evaluate(&w.conn, &alice, owner, &Params::game(w.alice_game))), 200);
        assert_eq!(status(evaluate(&w.conn, &alice, owner, &Params::game(w.bob_game))), 401);
        assert_eq!(status(evaluate(&w.conn, &alice, owner, &Params::game(9_999))), 404);
        assert_eq!(status(evaluate(&w.conn, &admin, owner, &Params::game(w.bob_game))), 200);
        assert_eq!(status(evaluate(&w.conn, &alice, owner, &Params::none())), 401);
    }

    #[test]
    fn session_ownership_by_key_and_login() {
        let w = world();
        let alice_key: Identity =
            resolve_key(&w.conn, &create_key(&w.conn, "k", w.alice.id, w.alice_game).expect("key").key)
                .expect("resolve")
                .into();
        let bob_key: Identity =
            resolve_key(&w.conn, &create_key(&w.conn, "k", w.bob.id, w.bob_game).expect("key").key)
                .expect("resolve")
                .into();
        let owner = Policy::Owner(owns_session);
        let params = Params::session(w.alice_session.clone());

        assert_eq!(status(evaluate(&w.conn, &alice_key, owner, &params)), 200);
        assert_eq!(status(evaluate(&w.conn, &bob_key, owner, &params)), 401);
        assert_eq!(status(evaluate(&w.conn, &login(&w.alice), owner, &params)), 200);
        assert_eq!(status(evaluate(&w.conn, &login(&w.bob), owner, &params)), 401);
        assert_eq!(
            status(evaluate(&w.conn, &login(&w.alice), owner, &Params::session("missing"))),
            404
        );
    }

    #[test]
    fn key_ownership() {
        let w = world();
        let key = create_key(&w.conn, "k", w.alice.id, w.alice_game).expect("key");
        let owner = Policy::Owner(owns_key);

        assert_eq!(
            status(evaluate(&w.conn, &login(&w.alice), owner, &Params::key(key.key.clone()))),
            200
        );
        assert_eq!(
            status(evaluate(&w.conn, &login(&w.bob), owner, &Params::key(key.key))),
            401
        );
        assert_eq!(
            status(evaluate(&w.conn, &login(&w.bob), owner, &Params::key("gone"))),
            404
        );
    }

    fn failing_check(_: &Connection, _: &Identity, _: &Params) -> Result<bool, StoreError> {
        Err(StoreError::InvalidFilter("lookup failed".to_string()))
    }

    #[test]
    fn failed_ownership_check_denies() {
        let w = world();
        let owner = Policy::Owner(failing_check);

        let err = evaluate(&w.conn, &login(&w.alice), owner, &Params::none())
            .expect_err("store failure denies");
        assert!(matches!(err, ApiError::Authorization(_)));
        assert_eq!(
            status(evaluate(&w.conn, &login(&w.admin), owner, &Params::none())),
            200
        );
    }

    #[test]
    fn event_scope_follows_identity() {
        let w = world();
        assert_eq!(login(&w.admin).event_scope(), EventScope::Unrestricted);
        assert_eq!(
            login(&w.alice).event_scope(),
            EventScope::Publisher(w.alice.id)
        );
        let key: Identity =
            resolve_key(&w.conn, &create_key(&w.conn, "k", w.bob.id, w.bob_game).expect("key").key)
                .expect("resolve")
                .into();
        assert_eq!(key.event_scope(), EventScope::Game(w.bob_game));
    }
}
