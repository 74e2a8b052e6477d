//! Demo pages served by the binary.

use pagesync_engine::{
    Engine, EventContext, HandlerResult, LifecycleContext, PageBundle, RegistryError,
};
use serde_json::json;

pub fn register(engine: &mut Engine) -> Result<(), RegistryError> {
    engine.page(
        PageBundle::builder("foo")
            .on_enter(foo_enter)
            .on_update(foo_update)
            .on_leave(foo_leave)
            .on_event("rename", foo_rename)
            .build()?,
    );
    engine.page(
        PageBundle::builder("bar")
            .on_enter(bar_enter)
            .keep(true)
            .build()?,
    );
    Ok(())
}

async fn foo_enter(ctx: LifecycleContext) -> HandlerResult {
    ctx.page.commit("changeAge", json!(18));
    ctx.page.commit("setName", json!("boen"));
    Ok(())
}

/// Echo the `age` route param back as page state.
async fn foo_update(ctx: LifecycleContext) -> HandlerResult {
    let age = ctx.payload["params"]["age"].clone();
    if !age.is_null() {
        ctx.page.commit("changeAge", age);
    }
    Ok(())
}

async fn foo_leave(ctx: LifecycleContext) -> HandlerResult {
    tracing::debug!(session_id = %ctx.page.session_id(), "left foo");
    Ok(())
}

async fn foo_rename(ctx: EventContext) -> HandlerResult {
    let name = ctx.data["name"].clone();
    ctx.page.commit("setName", name.clone());
    // Everyone else sees the latest name as a root-level commit.
    let _ = ctx.relay.broadcast("changeUser", name);
    Ok(())
}

async fn bar_enter(ctx: LifecycleContext) -> HandlerResult {
    if !ctx.retained {
        ctx.page.commit("changeLength", json!(666));
    }
    Ok(())
}
