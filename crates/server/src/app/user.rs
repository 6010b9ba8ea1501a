use kata_rpc::{
    from_row, AuthenticatedContext, Issues, Pipeline, Row, RouterBuilder, RpcError, RpcResult,
    SessionUser, Validate,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::models::USERS;

const MAX_NAME_CHARS: usize = 80;

pub fn router(pipeline: &Pipeline) -> RouterBuilder {
    RouterBuilder::new()
        .procedure("me", pipeline.protected().query(me))
        .procedure("updateProfile", pipeline.protected().mutation(update_profile))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfile {
    pub name: String,
}

impl Validate for UpdateProfile {
    fn validate(&self, issues: &mut Issues) {
        issues.require_non_empty("name", &self.name);
        issues.max_chars("name", &self.name, MAX_NAME_CHARS);
    }
}

async fn me(ctx: AuthenticatedContext, _input: ()) -> RpcResult<SessionUser> {
    Ok(ctx.session.user)
}

async fn update_profile(ctx: AuthenticatedContext, input: UpdateProfile) -> RpcResult<SessionUser> {
    let mut patch = Row::new();
    patch.insert("name".to_string(), Value::String(input.name.trim().to_string()));
    match ctx.db.update(USERS, &ctx.session.user.id, patch).await? {
        Some(row) => Ok(from_row(row)?),
        None => Err(RpcError::not_found("Your account no longer exists")),
    }
}
