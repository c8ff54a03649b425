/// Account lifecycle operations
///
/// Each operation looks up its target, asks the authorization policy, then
/// commits at most one record mutation through the account store.
use crate::{
    account::{
        ChangeLoginRequest, ChangePasswordRequest, CreateUserRequest, LoginRequest,
        SelfAuthenticateRequest, UpdateProfileRequest, UserInfo, UserListItem, MAX_AGE,
    },
    auth::{
        self, authorize, CallerIdentity, Decision, DenyReason, Operation, TokenIssuer,
    },
    config::BootstrapConfig,
    db::{
        account::{Account, Gender},
        store::AccountStore,
    },
    error::{ApiError, ApiResult},
    metrics,
};
use chrono::{DateTime, Months, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Actor recorded for changes made without an authenticated caller
pub const SYSTEM_ACTOR: &str = "System";

/// Account manager service
pub struct AccountManager {
    store: Arc<dyn AccountStore>,
    tokens: Arc<TokenIssuer>,
}

impl AccountManager {
    pub fn new(store: Arc<dyn AccountStore>, tokens: Arc<TokenIssuer>) -> Self {
        Self { store, tokens }
    }

    /// Register a new account
    pub async fn register(
        &self,
        request: CreateUserRequest,
        caller: Option<&CallerIdentity>,
    ) -> ApiResult<Account> {
        let result = self.register_inner(request, caller).await;
        observe(Operation::Register { admin: false }, result)
    }

    async fn register_inner(
        &self,
        request: CreateUserRequest,
        caller: Option<&CallerIdentity>,
    ) -> ApiResult<Account> {
        request.validate()?;

        if self.store.find_by_login(&request.login).await?.is_some() {
            return Err(ApiError::DuplicateLogin(request.login));
        }

        authorize(Operation::Register { admin: request.admin }, caller, None)
            .into_result()
            .map_err(|e| match e {
                ApiError::Forbidden(_) | ApiError::Unauthenticated(_) => {
                    ApiError::Forbidden("Only admins can create admin accounts".to_string())
                }
                other => other,
            })?;

        let password_hash = hash(request.password).await?;
        let actor = caller.map_or(SYSTEM_ACTOR, |c| c.login.as_str());
        let now = Utc::now();

        let account = Account {
            id: Uuid::new_v4(),
            login: request.login,
            password_hash,
            name: request.name,
            gender: request.gender,
            birthday: request.birthday,
            admin: request.admin,
            created_on: now,
            created_by: actor.to_string(),
            modified_on: now,
            modified_by: actor.to_string(),
            revoked_on: None,
            revoked_by: None,
        };

        self.store.insert(&account).await?;

        tracing::info!(
            login = %account.login,
            admin = account.admin,
            actor = %actor,
            "account registered"
        );

        Ok(account)
    }

    /// Verify credentials and issue a session token.
    ///
    /// Unknown logins, revoked accounts and wrong passwords all fail with the
    /// same `InvalidCredential`.
    pub async fn authenticate(&self, request: LoginRequest) -> ApiResult<(Account, String)> {
        let result = self.authenticate_inner(request).await;
        observe(Operation::Login, result)
    }

    async fn authenticate_inner(&self, request: LoginRequest) -> ApiResult<(Account, String)> {
        request.validate()?;

        let target = self.store.find_by_login(&request.login).await?;
        let decision = authorize(Operation::Login, None, target.as_ref());
        let account = match (decision, target) {
            (Decision::Allow, Some(account)) => account,
            (decision, _) => {
                // Same Argon2 cost as a wrong password for a real account
                verify_dummy(request.password).await?;
                if let Decision::Deny(reason) = decision {
                    tracing::info!(login = %request.login, reason = %reason, "login rejected");
                }
                return Err(ApiError::InvalidCredential);
            }
        };

        if !verify(request.password, account.password_hash.clone()).await? {
            tracing::info!(login = %account.login, "login rejected: password mismatch");
            return Err(ApiError::InvalidCredential);
        }

        let token = self.tokens.issue(&account)?;
        tracing::info!(login = %account.login, "login succeeded");

        Ok((account, token))
    }

    /// Replace name, gender and birthday
    pub async fn update_profile(
        &self,
        login: &str,
        request: UpdateProfileRequest,
        caller: &CallerIdentity,
    ) -> ApiResult<()> {
        let result = self.update_profile_inner(login, request, caller).await;
        observe(Operation::UpdateProfile, result)
    }

    async fn update_profile_inner(
        &self,
        login: &str,
        request: UpdateProfileRequest,
        caller: &CallerIdentity,
    ) -> ApiResult<()> {
        request.validate()?;

        let mut account = self
            .authorized_target(Operation::UpdateProfile, login, caller)
            .await?;

        account.name = request.name;
        account.gender = request.gender;
        account.birthday = request.birthday;
        account.touch(&caller.login, Utc::now());

        self.store.save(&account).await?;

        tracing::info!(login = %account.login, actor = %caller.login, "profile updated");
        Ok(())
    }

    /// Change password; non-admin callers must prove the current one
    pub async fn change_password(
        &self,
        login: &str,
        request: ChangePasswordRequest,
        caller: &CallerIdentity,
    ) -> ApiResult<()> {
        let result = self.change_password_inner(login, request, caller).await;
        observe(Operation::ChangePassword, result)
    }

    async fn change_password_inner(
        &self,
        login: &str,
        request: ChangePasswordRequest,
        caller: &CallerIdentity,
    ) -> ApiResult<()> {
        request.validate()?;

        let mut account = self
            .authorized_target(Operation::ChangePassword, login, caller)
            .await?;

        if !caller.is_admin() && !verify(request.old_password, account.password_hash.clone()).await? {
            tracing::info!(login = %account.login, "password change rejected: old password mismatch");
            return Err(ApiError::BadCredential);
        }

        account.password_hash = hash(request.new_password).await?;
        account.touch(&caller.login, Utc::now());

        self.store.save(&account).await?;

        tracing::info!(login = %account.login, actor = %caller.login, "password changed");
        Ok(())
    }

    /// Rename an account
    pub async fn change_login(
        &self,
        login: &str,
        request: ChangeLoginRequest,
        caller: &CallerIdentity,
    ) -> ApiResult<()> {
        let result = self.change_login_inner(login, request, caller).await;
        observe(Operation::ChangeLogin, result)
    }

    async fn change_login_inner(
        &self,
        login: &str,
        request: ChangeLoginRequest,
        caller: &CallerIdentity,
    ) -> ApiResult<()> {
        request.validate()?;

        let mut account = self
            .authorized_target(Operation::ChangeLogin, login, caller)
            .await?;

        // Also rejects renaming an account to its current login
        if self.store.find_by_login(&request.new_login).await?.is_some() {
            return Err(ApiError::DuplicateLogin(request.new_login));
        }

        let previous = std::mem::replace(&mut account.login, request.new_login);
        account.touch(&caller.login, Utc::now());

        self.store.save(&account).await?;

        tracing::info!(
            from = %previous,
            to = %account.login,
            actor = %caller.login,
            "login changed"
        );
        Ok(())
    }

    /// Active accounts ordered by creation time (admin only)
    pub async fn list_active(&self, caller: &CallerIdentity) -> ApiResult<Vec<UserListItem>> {
        let result = self.list_active_inner(caller).await;
        observe(Operation::ListActive, result)
    }

    async fn list_active_inner(&self, caller: &CallerIdentity) -> ApiResult<Vec<UserListItem>> {
        authorize(Operation::ListActive, Some(caller), None).into_result()?;

        let accounts = self.store.list_active().await?;
        Ok(accounts.iter().map(UserListItem::from).collect())
    }

    /// Profile of any account, active or revoked (admin only)
    pub async fn get_by_login(&self, login: &str, caller: &CallerIdentity) -> ApiResult<UserInfo> {
        let result = self.get_by_login_inner(login, caller).await;
        observe(Operation::GetByLogin, result)
    }

    async fn get_by_login_inner(&self, login: &str, caller: &CallerIdentity) -> ApiResult<UserInfo> {
        let target = self.store.find_by_login(login).await?;
        authorize(Operation::GetByLogin, Some(caller), target.as_ref()).into_result()?;

        let account = target.ok_or(ApiError::NotFound)?;
        Ok(UserInfo::from(&account))
    }

    /// Re-check the caller's own password and return their profile.
    ///
    /// Only a missing caller is reported distinctly; every other failure is
    /// an `InvalidCredential`.
    pub async fn self_authenticate(
        &self,
        login: &str,
        request: SelfAuthenticateRequest,
        caller: &CallerIdentity,
    ) -> ApiResult<UserInfo> {
        let result = self.self_authenticate_inner(login, request, caller).await;
        observe(Operation::SelfAuthenticate, result)
    }

    async fn self_authenticate_inner(
        &self,
        login: &str,
        request: SelfAuthenticateRequest,
        caller: &CallerIdentity,
    ) -> ApiResult<UserInfo> {
        request.validate()?;

        let target = self.store.find_by_login(login).await?;
        let decision = authorize(Operation::SelfAuthenticate, Some(caller), target.as_ref());
        let account = match (decision, target) {
            (Decision::Allow, Some(account)) => account,
            (Decision::Deny(DenyReason::Unauthenticated), _) => {
                return Err(DenyReason::Unauthenticated.into())
            }
            (decision, _) => {
                verify_dummy(request.password).await?;
                if let Decision::Deny(reason) = decision {
                    tracing::info!(login = %login, actor = %caller.login, reason = %reason, "self-authentication rejected");
                }
                return Err(ApiError::InvalidCredential);
            }
        };

        if !verify(request.password, account.password_hash.clone()).await? {
            tracing::info!(login = %login, "self-authentication rejected: password mismatch");
            return Err(ApiError::InvalidCredential);
        }

        Ok(UserInfo::from(&account))
    }

    /// Active accounts at least `age` full years old today (admin only)
    pub async fn users_older_than(
        &self,
        age: u32,
        caller: &CallerIdentity,
    ) -> ApiResult<Vec<UserInfo>> {
        self.users_older_than_at(age, Utc::now(), caller).await
    }

    /// Same as [`Self::users_older_than`], measured from `now`
    pub async fn users_older_than_at(
        &self,
        age: u32,
        now: DateTime<Utc>,
        caller: &CallerIdentity,
    ) -> ApiResult<Vec<UserInfo>> {
        let result = self.users_older_than_inner(age, now, caller).await;
        observe(Operation::QueryByMinimumAge, result)
    }

    async fn users_older_than_inner(
        &self,
        age: u32,
        now: DateTime<Utc>,
        caller: &CallerIdentity,
    ) -> ApiResult<Vec<UserInfo>> {
        authorize(Operation::QueryByMinimumAge, Some(caller), None).into_result()?;

        if age > MAX_AGE {
            return Err(ApiError::Validation(format!(
                "age: must be between 0 and {}",
                MAX_AGE
            )));
        }

        // Calendar subtraction: 29 February clamps to 28 February
        let cutoff = now
            .date_naive()
            .checked_sub_months(Months::new(age * 12))
            .ok_or_else(|| ApiError::Validation("age: out of range".to_string()))?;

        let accounts = self.store.list_active_born_on_or_before(cutoff).await?;
        Ok(accounts.iter().map(UserInfo::from).collect())
    }

    /// Soft-delete (revoke) or permanently remove an account (admin only)
    pub async fn delete_account(
        &self,
        login: &str,
        hard: bool,
        caller: &CallerIdentity,
    ) -> ApiResult<()> {
        let op = if hard {
            Operation::HardDelete
        } else {
            Operation::SoftDelete
        };
        let result = self.delete_account_inner(op, login, caller).await;
        observe(op, result)
    }

    async fn delete_account_inner(
        &self,
        op: Operation,
        login: &str,
        caller: &CallerIdentity,
    ) -> ApiResult<()> {
        let target = self.store.find_by_login(login).await?;
        authorize(op, Some(caller), target.as_ref()).into_result()?;
        let mut account = target.ok_or(ApiError::NotFound)?;

        if op == Operation::HardDelete {
            self.store.remove(&account).await?;
            tracing::warn!(
                login = %account.login,
                id = %account.id,
                actor = %caller.login,
                "account permanently deleted"
            );
            return Ok(());
        }

        if account.is_revoked() {
            tracing::debug!(login = %account.login, "account already revoked");
            return Ok(());
        }

        account.revoke(&caller.login, Utc::now());
        self.store.save(&account).await?;

        tracing::info!(login = %account.login, actor = %caller.login, "account revoked");
        Ok(())
    }

    /// Bring a revoked account back (admin only)
    pub async fn restore_account(&self, login: &str, caller: &CallerIdentity) -> ApiResult<()> {
        let result = self.restore_account_inner(login, caller).await;
        observe(Operation::Restore, result)
    }

    async fn restore_account_inner(&self, login: &str, caller: &CallerIdentity) -> ApiResult<()> {
        let target = self.store.find_by_login(login).await?;
        authorize(Operation::Restore, Some(caller), target.as_ref()).into_result()?;
        let mut account = target.ok_or(ApiError::NotFoundOrNotRevoked)?;

        account.restore(&caller.login, Utc::now());
        self.store.save(&account).await?;

        tracing::info!(login = %account.login, actor = %caller.login, "account restored");
        Ok(())
    }

    /// Seed the first admin account into an empty store.
    ///
    /// Returns `true` when an account was created.
    pub async fn ensure_bootstrap_admin(&self, config: &BootstrapConfig) -> ApiResult<bool> {
        if self.store.count().await? > 0 {
            return Ok(false);
        }

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            login: config.admin_login.clone(),
            password_hash: hash(config.admin_password.clone()).await?,
            name: "Administrator".to_string(),
            gender: Gender::Unspecified,
            birthday: None,
            admin: true,
            created_on: now,
            created_by: SYSTEM_ACTOR.to_string(),
            modified_on: now,
            modified_by: SYSTEM_ACTOR.to_string(),
            revoked_on: None,
            revoked_by: None,
        };

        match self.store.insert(&account).await {
            Ok(()) => {
                tracing::info!(login = %account.login, "seeded bootstrap admin account");
                Ok(true)
            }
            // Another instance seeded first
            Err(ApiError::DuplicateLogin(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Look up the target of a per-account mutation and apply the policy
    async fn authorized_target(
        &self,
        op: Operation,
        login: &str,
        caller: &CallerIdentity,
    ) -> ApiResult<Account> {
        let target = self.store.find_by_login(login).await?;
        authorize(op, Some(caller), target.as_ref()).into_result()?;
        target.ok_or(ApiError::NotFoundOrRevoked)
    }
}

fn observe<T>(op: Operation, result: ApiResult<T>) -> ApiResult<T> {
    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    metrics::record_account_operation(op.as_str(), outcome);
    result
}

/// Argon2 is CPU-bound; keep it off the async workers
async fn hash(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hashing task failed: {}", e)))?
}

async fn verify(password: String, password_hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || auth::verify_password(&password, &password_hash))
        .await
        .map_err(|e| ApiError::Internal(format!("Password verification task failed: {}", e)))
}

/// Burn one verification when there is no stored hash to check
async fn verify_dummy(password: String) -> ApiResult<()> {
    tokio::task::spawn_blocking(move || auth::verify_dummy_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("Password verification task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::Role,
        config::AuthConfig,
        db::{create_memory_pool, run_migrations, store::SqliteAccountStore},
    };
    use chrono::{NaiveDate, TimeZone};

    async fn setup() -> (AccountManager, Arc<TokenIssuer>, Arc<dyn AccountStore>) {
        let pool = create_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let store: Arc<dyn AccountStore> = Arc::new(SqliteAccountStore::new(pool));
        let tokens = Arc::new(TokenIssuer::new(&AuthConfig {
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            jwt_issuer: "UserManagementApi".to_string(),
            jwt_audience: "UserManagementApiClient".to_string(),
        }));

        (
            AccountManager::new(store.clone(), tokens.clone()),
            tokens,
            store,
        )
    }

    fn create_request(login: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            login: login.to_string(),
            password: password.to_string(),
            name: "Alice".to_string(),
            gender: Gender::Male,
            birthday: None,
            admin: false,
        }
    }

    fn login_request(login: &str, password: &str) -> LoginRequest {
        LoginRequest {
            login: login.to_string(),
            password: password.to_string(),
        }
    }

    fn admin() -> CallerIdentity {
        CallerIdentity::new(Some(Uuid::new_v4()), "admin", Role::Admin)
    }

    fn caller_for(account: &Account) -> CallerIdentity {
        CallerIdentity::new(Some(account.id), account.login.clone(), Role::for_account(account))
    }

    fn profile(name: &str) -> UpdateProfileRequest {
        UpdateProfileRequest {
            name: name.to_string(),
            gender: Gender::Female,
            birthday: NaiveDate::from_ymd_opt(1990, 1, 15),
        }
    }

    fn assert_revocation_pair(account: &Account) {
        assert_eq!(account.revoked_on.is_none(), account.revoked_by.is_none());
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (manager, tokens, _) = setup().await;

        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();
        assert_eq!(alice.created_by, SYSTEM_ACTOR);
        assert!(!alice.admin);
        assert_ne!(alice.password_hash, "pw1");

        let wrong = manager.authenticate(login_request("alice", "wrong")).await;
        assert!(matches!(wrong, Err(ApiError::InvalidCredential)));

        let (_, token) = manager
            .authenticate(login_request("alice", "pw1"))
            .await
            .unwrap();
        let caller = tokens.verify(&token).unwrap();
        assert_eq!(caller.role, Role::User);
        assert_eq!(caller.login, "alice");
        assert_eq!(caller.id, Some(alice.id));
    }

    #[tokio::test]
    async fn test_login_unknown_user_is_indistinguishable() {
        let (manager, _, _) = setup().await;
        let result = manager.authenticate(login_request("nobody", "pw")).await;
        assert!(matches!(result, Err(ApiError::InvalidCredential)));
    }

    #[tokio::test]
    async fn test_failed_login_costs_the_same_for_unknown_accounts() {
        let (manager, _, _) = setup().await;
        manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();
        // Builds the fixed hash used for unknown logins
        let _ = manager.authenticate(login_request("nobody", "pw")).await;

        let start = std::time::Instant::now();
        for _ in 0..3 {
            let result = manager.authenticate(login_request("alice", "wrong")).await;
            assert!(matches!(result, Err(ApiError::InvalidCredential)));
        }
        let wrong_password = start.elapsed();

        let start = std::time::Instant::now();
        for _ in 0..3 {
            let result = manager.authenticate(login_request("nobody", "wrong")).await;
            assert!(matches!(result, Err(ApiError::InvalidCredential)));
        }
        let unknown_login = start.elapsed();

        assert!(
            unknown_login * 4 >= wrong_password,
            "unknown login took {:?}, wrong password {:?}",
            unknown_login,
            wrong_password
        );
    }

    #[tokio::test]
    async fn test_revoked_account_cannot_login() {
        let (manager, _, _) = setup().await;
        manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();
        manager.delete_account("alice", false, &admin()).await.unwrap();

        let result = manager.authenticate(login_request("alice", "pw1")).await;
        assert!(matches!(result, Err(ApiError::InvalidCredential)));
    }

    #[tokio::test]
    async fn test_register_duplicate_login() {
        let (manager, _, _) = setup().await;
        manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        let result = manager.register(create_request("alice", "pw2"), None).await;
        assert!(matches!(result, Err(ApiError::DuplicateLogin(_))));
    }

    #[tokio::test]
    async fn test_concurrent_registration_single_winner() {
        let (manager, _, store) = setup().await;

        let (a, b) = tokio::join!(
            manager.register(create_request("alice", "pw1"), None),
            manager.register(create_request("alice", "pw2"), None),
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(ApiError::DuplicateLogin(_)))));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_admin_cannot_create_admin() {
        let (manager, _, store) = setup().await;
        let bob = manager
            .register(create_request("bob", "pw"), None)
            .await
            .unwrap();

        let mut request = create_request("eve", "pw");
        request.admin = true;

        let anonymous = manager.register(request.clone(), None).await;
        assert!(matches!(anonymous, Err(ApiError::Forbidden(_))));

        let as_user = manager.register(request.clone(), Some(&caller_for(&bob))).await;
        assert!(matches!(as_user, Err(ApiError::Forbidden(_))));
        assert!(store.find_by_login("eve").await.unwrap().is_none());

        let created = manager.register(request, Some(&admin())).await.unwrap();
        assert!(created.admin);
        assert_eq!(created.created_by, "admin");
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_fields() {
        let (manager, _, _) = setup().await;

        let mut request = create_request("alice", "pw");
        request.name = "Alice1".to_string();
        let result = manager.register(request, None).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_profile_by_owner_and_admin() {
        let (manager, _, store) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        manager
            .update_profile("alice", profile("Alicia"), &caller_for(&alice))
            .await
            .unwrap();
        let stored = store.find_by_login("alice").await.unwrap().unwrap();
        assert_eq!(stored.name, "Alicia");
        assert_eq!(stored.modified_by, "alice");
        assert!(stored.modified_on >= stored.created_on);
        assert_eq!(stored.created_by, SYSTEM_ACTOR);

        manager
            .update_profile("alice", profile("Алиса"), &admin())
            .await
            .unwrap();
        let stored = store.find_by_login("alice").await.unwrap().unwrap();
        assert_eq!(stored.name, "Алиса");
        assert_eq!(stored.modified_by, "admin");
    }

    #[tokio::test]
    async fn test_update_profile_of_other_user_forbidden() {
        let (manager, _, _) = setup().await;
        manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();
        let bob = manager
            .register(create_request("bob", "pw2"), None)
            .await
            .unwrap();

        let result = manager
            .update_profile("alice", profile("Mallory"), &caller_for(&bob))
            .await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_update_missing_account() {
        let (manager, _, _) = setup().await;
        let result = manager
            .update_profile("ghost", profile("Ghost"), &admin())
            .await;
        assert!(matches!(result, Err(ApiError::NotFoundOrRevoked)));
    }

    #[tokio::test]
    async fn test_soft_delete_scenario() {
        let (manager, _, store) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        manager.delete_account("alice", false, &admin()).await.unwrap();

        let info = manager.get_by_login("alice", &admin()).await.unwrap();
        assert!(!info.is_active);

        let result = manager
            .update_profile("alice", profile("Alice"), &caller_for(&alice))
            .await;
        assert!(matches!(result, Err(ApiError::NotFoundOrRevoked)));

        let stored = store.find_by_login("alice").await.unwrap().unwrap();
        assert_eq!(stored.revoked_by.as_deref(), Some("admin"));
        assert_revocation_pair(&stored);
    }

    #[tokio::test]
    async fn test_soft_delete_twice_keeps_first_stamp() {
        let (manager, _, store) = setup().await;
        manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        manager.delete_account("alice", false, &admin()).await.unwrap();
        let first = store.find_by_login("alice").await.unwrap().unwrap();

        let other_admin = CallerIdentity::new(None, "root", Role::Admin);
        manager
            .delete_account("alice", false, &other_admin)
            .await
            .unwrap();
        let second = store.find_by_login("alice").await.unwrap().unwrap();

        assert_eq!(first.revoked_on, second.revoked_on);
        assert_eq!(second.revoked_by.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let (manager, _, store) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        manager.delete_account("alice", false, &admin()).await.unwrap();
        manager.restore_account("alice", &admin()).await.unwrap();

        let stored = store.find_by_login("alice").await.unwrap().unwrap();
        assert!(stored.is_active());
        assert_revocation_pair(&stored);
        assert_eq!(stored.modified_by, "admin");

        // Policy treats the restored account like one never revoked
        manager
            .update_profile("alice", profile("Alice"), &caller_for(&alice))
            .await
            .unwrap();
        manager
            .authenticate(login_request("alice", "pw1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_restore_requires_revoked_target() {
        let (manager, _, _) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        let active = manager.restore_account("alice", &admin()).await;
        assert!(matches!(active, Err(ApiError::NotFoundOrNotRevoked)));

        let missing = manager.restore_account("ghost", &admin()).await;
        assert!(matches!(missing, Err(ApiError::NotFoundOrNotRevoked)));

        manager.delete_account("alice", false, &admin()).await.unwrap();
        let by_user = manager.restore_account("alice", &caller_for(&alice)).await;
        assert!(matches!(by_user, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_hard_delete_frees_login() {
        let (manager, _, _) = setup().await;
        let first = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        manager.delete_account("alice", true, &admin()).await.unwrap();

        let lookup = manager.get_by_login("alice", &admin()).await;
        assert!(matches!(lookup, Err(ApiError::NotFound)));

        let second = manager
            .register(create_request("alice", "pw2"), None)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_delete_requires_admin() {
        let (manager, _, store) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        let result = manager
            .delete_account("alice", true, &caller_for(&alice))
            .await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
        assert!(store.find_by_login("alice").await.unwrap().is_some());

        let missing = manager.delete_account("ghost", false, &admin()).await;
        assert!(matches!(missing, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn test_change_login_to_taken_login() {
        let (manager, _, store) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();
        manager
            .register(create_request("bob", "pw2"), None)
            .await
            .unwrap();

        let taken = manager
            .change_login(
                "alice",
                ChangeLoginRequest {
                    new_login: "bob".to_string(),
                },
                &caller_for(&alice),
            )
            .await;
        assert!(matches!(taken, Err(ApiError::DuplicateLogin(_))));

        let same = manager
            .change_login(
                "alice",
                ChangeLoginRequest {
                    new_login: "alice".to_string(),
                },
                &caller_for(&alice),
            )
            .await;
        assert!(matches!(same, Err(ApiError::DuplicateLogin(_))));

        let stored = store.find_by_login("alice").await.unwrap().unwrap();
        assert_eq!(stored.id, alice.id);
    }

    #[tokio::test]
    async fn test_change_login() {
        let (manager, _, store) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        manager
            .change_login(
                "alice",
                ChangeLoginRequest {
                    new_login: "alice2".to_string(),
                },
                &caller_for(&alice),
            )
            .await
            .unwrap();

        assert!(store.find_by_login("alice").await.unwrap().is_none());
        let renamed = store.find_by_login("alice2").await.unwrap().unwrap();
        assert_eq!(renamed.id, alice.id);
        manager
            .authenticate(login_request("alice2", "pw1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_old_token_cannot_take_over_reused_login() {
        let (manager, tokens, store) = setup().await;
        manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();
        let (_, token) = manager
            .authenticate(login_request("alice", "pw1"))
            .await
            .unwrap();
        let stale = tokens.verify(&token).unwrap();

        manager
            .change_login(
                "alice",
                ChangeLoginRequest {
                    new_login: "alice2".to_string(),
                },
                &stale,
            )
            .await
            .unwrap();
        let newcomer = manager
            .register(create_request("alice", "pw2"), None)
            .await
            .unwrap();

        let profile_change = manager
            .update_profile("alice", profile("Mallory"), &stale)
            .await;
        assert!(matches!(profile_change, Err(ApiError::Forbidden(_))));

        let rename = manager
            .change_login(
                "alice",
                ChangeLoginRequest {
                    new_login: "stolen".to_string(),
                },
                &stale,
            )
            .await;
        assert!(matches!(rename, Err(ApiError::Forbidden(_))));

        let password_change = manager
            .change_password(
                "alice",
                ChangePasswordRequest {
                    old_password: "pw1".to_string(),
                    new_password: "pw9".to_string(),
                },
                &stale,
            )
            .await;
        assert!(matches!(password_change, Err(ApiError::Forbidden(_))));

        let stored = store.find_by_login("alice").await.unwrap().unwrap();
        assert_eq!(stored.id, newcomer.id);
        assert_eq!(stored.name, "Alice");
        assert!(store.find_by_login("stolen").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_password() {
        let (manager, _, _) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        let wrong_old = manager
            .change_password(
                "alice",
                ChangePasswordRequest {
                    old_password: "nope".to_string(),
                    new_password: "pw2".to_string(),
                },
                &caller_for(&alice),
            )
            .await;
        assert!(matches!(wrong_old, Err(ApiError::BadCredential)));

        manager
            .change_password(
                "alice",
                ChangePasswordRequest {
                    old_password: "pw1".to_string(),
                    new_password: "pw2".to_string(),
                },
                &caller_for(&alice),
            )
            .await
            .unwrap();
        assert!(manager
            .authenticate(login_request("alice", "pw1"))
            .await
            .is_err());
        manager
            .authenticate(login_request("alice", "pw2"))
            .await
            .unwrap();

        // Admins reset without the current password
        manager
            .change_password(
                "alice",
                ChangePasswordRequest {
                    old_password: String::new(),
                    new_password: "pw3".to_string(),
                },
                &admin(),
            )
            .await
            .unwrap();
        manager
            .authenticate(login_request("alice", "pw3"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_self_authenticate() {
        let (manager, _, _) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();
        let bob = manager
            .register(create_request("bob", "pw2"), None)
            .await
            .unwrap();
        let request = |password: &str| SelfAuthenticateRequest {
            password: password.to_string(),
        };

        let info = manager
            .self_authenticate("alice", request("pw1"), &caller_for(&alice))
            .await
            .unwrap();
        assert_eq!(info.login, "alice");
        assert!(info.is_active);

        let wrong_password = manager
            .self_authenticate("alice", request("pw2"), &caller_for(&alice))
            .await;
        assert!(matches!(wrong_password, Err(ApiError::InvalidCredential)));

        let other_caller = manager
            .self_authenticate("alice", request("pw1"), &caller_for(&bob))
            .await;
        assert!(matches!(other_caller, Err(ApiError::InvalidCredential)));

        let missing = manager
            .self_authenticate("ghost", request("pw1"), &caller_for(&alice))
            .await;
        assert!(matches!(missing, Err(ApiError::InvalidCredential)));
    }

    #[tokio::test]
    async fn test_list_active_requires_admin_and_skips_revoked() {
        let (manager, _, _) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();
        manager
            .register(create_request("bob", "pw2"), None)
            .await
            .unwrap();
        manager
            .register(create_request("carol", "pw3"), None)
            .await
            .unwrap();
        manager.delete_account("bob", false, &admin()).await.unwrap();

        let denied = manager.list_active(&caller_for(&alice)).await;
        assert!(matches!(denied, Err(ApiError::Forbidden(_))));

        let logins: Vec<String> = manager
            .list_active(&admin())
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.login)
            .collect();
        assert_eq!(logins, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn test_users_older_than_cutoff() {
        let (manager, _, _) = setup().await;
        let born = |login: &str, y: i32, m: u32, d: u32| {
            let mut request = create_request(login, "pw");
            request.birthday = NaiveDate::from_ymd_opt(y, m, d);
            request
        };

        manager.register(born("exactly", 1995, 6, 16), None).await.unwrap();
        manager.register(born("younger", 1995, 6, 17), None).await.unwrap();
        manager.register(born("older", 1980, 1, 1), None).await.unwrap();
        manager.register(born("revoked", 1950, 1, 1), None).await.unwrap();
        manager
            .register(create_request("nobirthday", "pw"), None)
            .await
            .unwrap();
        manager.delete_account("revoked", false, &admin()).await.unwrap();

        let now = Utc.with_ymd_and_hms(2025, 6, 16, 12, 0, 0).unwrap();
        let mut logins: Vec<String> = manager
            .users_older_than_at(30, now, &admin())
            .await
            .unwrap()
            .into_iter()
            .map(|info| {
                assert!(info.is_active);
                info.login
            })
            .collect();
        logins.sort();
        assert_eq!(logins, vec!["exactly", "older"]);
    }

    #[tokio::test]
    async fn test_users_older_than_validation() {
        let (manager, _, _) = setup().await;
        let alice = manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        let denied = manager.users_older_than(30, &caller_for(&alice)).await;
        assert!(matches!(denied, Err(ApiError::Forbidden(_))));

        let too_old = manager.users_older_than(MAX_AGE + 1, &admin()).await;
        assert!(matches!(too_old, Err(ApiError::Validation(_))));

        tokio_test::assert_ok!(manager.users_older_than(0, &admin()).await);
    }

    #[tokio::test]
    async fn test_bootstrap_admin_seeded_once() {
        let (manager, tokens, store) = setup().await;
        let config = BootstrapConfig {
            admin_login: "admin".to_string(),
            admin_password: "Admin123".to_string(),
        };

        assert!(manager.ensure_bootstrap_admin(&config).await.unwrap());
        assert!(!manager.ensure_bootstrap_admin(&config).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);

        let (account, token) = manager
            .authenticate(login_request("admin", "Admin123"))
            .await
            .unwrap();
        assert!(account.admin);
        assert_eq!(account.created_by, SYSTEM_ACTOR);
        assert_eq!(tokens.verify(&token).unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn test_bootstrap_skipped_for_populated_store() {
        let (manager, _, store) = setup().await;
        manager
            .register(create_request("alice", "pw1"), None)
            .await
            .unwrap();

        let config = BootstrapConfig {
            admin_login: "admin".to_string(),
            admin_password: "Admin123".to_string(),
        };
        assert!(!manager.ensure_bootstrap_admin(&config).await.unwrap());
        assert!(store.find_by_login("admin").await.unwrap().is_none());
    }
}
