//! RPC Handlers
//!
//! Define your handlers here and register them in create_router().

use super::context::{AppState, CATEGORY_CACHE_TTL, categories_cache_id};
use super::identity::StoreIdentity;
use super::types::{
    CreateCategoryInput, DeleteCategoryInput, HealthResponse, NewCategory, SetDiscordIdInput,
    SuccessResponse, User,
};
use super::usage::{Usage, first_of_next_month, start_of_month};
use chrono::Utc;
use tracing::{debug, info};
use typed_rpc::prelude::*;
use typed_rpc::{CompileError, Operation};

// =============================================================================
// Procedures
// =============================================================================

/// Procedure every operation starts from.
pub fn public_procedure(log: LogConfig) -> Procedure<AppState> {
    Procedure::new().use_middleware(logging_middleware(log))
}

/// `public` plus an identity requirement.
pub fn private_procedure(public: &Procedure<AppState>, identity: StoreIdentity) -> Procedure<AppState> {
    public.use_middleware(auth_middleware(identity))
}

// =============================================================================
// Router
// =============================================================================

/// Create the application router
pub fn create_router(identity: StoreIdentity, log: LogConfig) -> Router<AppState> {
    let public = public_procedure(log);
    let private = private_procedure(&public, identity);

    Router::new()
        .operation("health", public.query(health_handler))
        .merge("project", project_router(&private))
        .merge("category", category_router(&private))
}

/// Compile the application router over `state`.
pub fn compile_router(state: AppState, config: RpcConfig) -> Result<CompiledRouter, CompileError> {
    let identity = StoreIdentity::new(state.store.clone());
    let log = LogConfig::default().exclude_operation("health");
    create_router(identity, log).compile(state, config)
}

fn project_router(private: &Procedure<AppState>) -> Router<AppState> {
    Router::new()
        .operation("getUsage", private.query(get_usage))
        .operation(
            "setDiscordID",
            private.input::<SetDiscordIdInput>().mutation(set_discord_id),
        )
}

fn category_router(private: &Procedure<AppState>) -> Router<AppState> {
    let create: Operation<AppState> = private
        .input::<CreateCategoryInput>()
        .mutation(create_event_category);
    let delete: Operation<AppState> = private
        .input::<DeleteCategoryInput>()
        .mutation(delete_category);

    Router::new()
        .operation("getEventCategories", private.query(get_event_categories))
        .operation("createEventCategory", create)
        .operation("deleteCategory", delete)
}

// =============================================================================
// Root Handlers
// =============================================================================

async fn health_handler(args: HandlerArgs<AppState, ()>) -> RpcResult<Reply> {
    args.json(&HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

// =============================================================================
// Project Handlers
// =============================================================================

async fn get_usage(args: HandlerArgs<AppState, ()>) -> RpcResult<Reply> {
    let user = args.ctx.require::<User>(USER_KEY)?;
    let now = Utc::now();

    let categories_used = args.ctx.store.category_count(&user.id).await?;
    let events_used = args
        .ctx
        .store
        .events_since(&user.id, start_of_month(now)?)
        .await?;

    let usage = Usage::new(user.plan, categories_used, events_used, first_of_next_month(now)?);
    args.structured(&usage)
}

async fn set_discord_id(args: HandlerArgs<AppState, SetDiscordIdInput>) -> RpcResult<Reply> {
    let user = args.ctx.require::<User>(USER_KEY)?;
    args.ctx
        .store
        .set_discord_id(&user.id, &args.input.discord_id)
        .await?;
    args.json(&SuccessResponse::ok())
}

// =============================================================================
// Category Handlers
// =============================================================================

async fn get_event_categories(args: HandlerArgs<AppState, ()>) -> RpcResult<Reply> {
    let user = args.ctx.require::<User>(USER_KEY)?;
    let store = args.ctx.store.clone();
    let user_id = user.id.clone();

    let categories = args
        .ctx
        .cache
        .get_or_load(&categories_cache_id(&user.id), CATEGORY_CACHE_TTL, || async move {
            let categories = store.categories(&user_id).await?;
            debug!(user_id = %user_id, count = categories.len(), "Loaded categories");
            Ok::<_, RpcError>(RichValue::object([(
                "categories",
                RichValue::Array(categories.iter().map(RichValue::from).collect()),
            )]))
        })
        .await?;
    args.structured(categories)
}

async fn create_event_category(args: HandlerArgs<AppState, CreateCategoryInput>) -> RpcResult<Reply> {
    let user = args.ctx.require::<User>(USER_KEY)?;

    let category = args
        .ctx
        .store
        .create_category(
            &user.id,
            NewCategory::from(args.input.clone()),
            user.plan.category_limit(),
        )
        .await?;
    args.ctx.cache.invalidate(&categories_cache_id(&user.id)).await;
    info!(user_id = %user.id, category = %category.name, "Event category created");
    args.structured(&category)
}

async fn delete_category(args: HandlerArgs<AppState, DeleteCategoryInput>) -> RpcResult<Reply> {
    let user = args.ctx.require::<User>(USER_KEY)?;
    let name = args.input.name.trim();

    if !args.ctx.store.delete_category(&user.id, name).await? {
        return Err(RpcError::not_found(format!("Category '{}' not found", name)));
    }
    args.ctx.cache.invalidate(&categories_cache_id(&user.id)).await;
    args.json(&SuccessResponse::ok())
}
