use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{MembershipError, MembershipResult};
use crate::models::{NewUser, Plan, User};

/// Persistence for users, plans and subscriptions
#[async_trait]
pub trait SubscriptionStore: Send + Sync + 'static {
    /// Get a plan by ID
    async fn find_plan(&self, id: i64) -> MembershipResult<Option<Plan>>;

    /// List all plans, cheapest first
    async fn list_plans(&self) -> MembershipResult<Vec<Plan>>;

    /// Get a user by ID, with their current plan
    async fn find_user(&self, id: i64) -> MembershipResult<Option<User>>;

    /// Get a user by email
    async fn find_user_by_email(&self, email: &str) -> MembershipResult<Option<User>>;

    /// Create an inactive user
    async fn insert_user(&self, user: NewUser) -> MembershipResult<User>;

    /// Replace an existing user
    async fn update_user(&self, user: User) -> MembershipResult<User>;

    /// Record that `user_id` is subscribed to `plan_id`, replacing any previous plan
    async fn subscribe_user_to_plan(&self, user_id: i64, plan_id: i64) -> MembershipResult<()>;
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<i64, User>,
    plans: BTreeMap<i64, Plan>,
    /// user id → plan id
    subscriptions: HashMap<i64, i64>,
    next_user_id: i64,
}

impl State {
    fn with_plan(&self, mut user: User) -> User {
        user.plan = self
            .subscriptions
            .get(&user.id)
            .and_then(|plan_id| self.plans.get(plan_id))
            .cloned();
        user
    }
}

/// In-memory implementation of SubscriptionStore (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemorySubscriptionStore {
    state: Arc<RwLock<State>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the site's three plans
    pub fn with_default_plans() -> Self {
        Self::with_plans([
            Plan::new(1, "Bronze Plan", 1000),
            Plan::new(2, "Silver Plan", 2000),
            Plan::new(3, "Gold Plan", 3000),
        ])
    }

    pub fn with_plans(plans: impl IntoIterator<Item = Plan>) -> Self {
        let state = State {
            plans: plans.into_iter().map(|p| (p.id, p)).collect(),
            ..State::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_plan(&self, id: i64) -> MembershipResult<Option<Plan>> {
        let state = self.state.read().await;
        Ok(state.plans.get(&id).cloned())
    }

    async fn list_plans(&self) -> MembershipResult<Vec<Plan>> {
        let state = self.state.read().await;
        let mut plans: Vec<Plan> = state.plans.values().cloned().collect();
        plans.sort_by_key(|p| p.amount_cents);
        Ok(plans)
    }

    async fn find_user(&self, id: i64) -> MembershipResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).cloned().map(|u| state.with_plan(u)))
    }

    async fn find_user_by_email(&self, email: &str) -> MembershipResult<Option<User>> {
        let state = self.state.read().await;
        let user = state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .map(|u| state.with_plan(u));
        Ok(user)
    }

    async fn insert_user(&self, new_user: NewUser) -> MembershipResult<User> {
        let mut state = self.state.write().await;

        // Check for duplicate email
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(MembershipError::DuplicateEmail(new_user.email));
        }

        state.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: state.next_user_id,
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            active: false,
            is_admin: false,
            plan: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());

        tracing::info!(user_id = user.id, email = %user.email, "Created user");
        Ok(user)
    }

    async fn update_user(&self, mut user: User) -> MembershipResult<User> {
        let mut state = self.state.write().await;

        if !state.users.contains_key(&user.id) {
            return Err(MembershipError::UserNotFound(user.id));
        }

        user.updated_at = Utc::now();
        state.users.insert(user.id, user.clone());

        tracing::info!(user_id = user.id, "Updated user");
        Ok(state.with_plan(user))
    }

    async fn subscribe_user_to_plan(&self, user_id: i64, plan_id: i64) -> MembershipResult<()> {
        let mut state = self.state.write().await;

        if !state.users.contains_key(&user_id) {
            return Err(MembershipError::UserNotFound(user_id));
        }
        if !state.plans.contains_key(&plan_id) {
            return Err(MembershipError::PlanNotFound(plan_id));
        }

        state.subscriptions.insert(user_id, plan_id);
        tracing::info!(user_id, plan_id, "Subscribed user to plan");
        Ok(())
    }
}
