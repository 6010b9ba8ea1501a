//! Administrator procedures. Every entry here is built with `Pipeline::admin`.

use kata_rpc::{
    from_row, AuthenticatedContext, Filter, Issues, Pipeline, Row, RouterBuilder, RpcError,
    RpcResult, SessionUser, Validate,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::{SessionRecord, SESSIONS, USERS};
use crate::sessions::issue_session;

pub fn router(pipeline: &Pipeline) -> RouterBuilder {
    RouterBuilder::new()
        .procedure("listUsers", pipeline.admin().query(list_users))
        .procedure("setBanned", pipeline.admin().mutation(set_banned))
        .procedure("impersonate", pipeline.admin().mutation(impersonate))
        .procedure("impersonations", pipeline.admin().query(impersonations))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SetBanned {
    pub user_id: String,
    pub banned: bool,
}

impl Validate for SetBanned {
    fn validate(&self, issues: &mut Issues) {
        issues.require_non_empty("userId", &self.user_id);
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Impersonate {
    pub user_id: String,
}

impl Validate for Impersonate {
    fn validate(&self, issues: &mut Issues) {
        issues.require_non_empty("userId", &self.user_id);
    }
}

#[derive(Debug, Serialize)]
pub struct Impersonation {
    pub token: String,
    pub user: SessionUser,
}

/// Audit view of sessions issued through `impersonate`. Token digests stay private.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationRecord {
    pub session_id: String,
    pub user_id: String,
    pub impersonated_by: String,
}

async fn list_users(ctx: AuthenticatedContext, _input: ()) -> RpcResult<Vec<SessionUser>> {
    let rows = ctx.db.select(USERS, &Filter::all()).await?;
    Ok(rows
        .into_iter()
        .map(from_row::<SessionUser>)
        .collect::<Result<Vec<_>, _>>()?)
}

async fn set_banned(ctx: AuthenticatedContext, input: SetBanned) -> RpcResult<SessionUser> {
    if input.user_id == ctx.session.user.id {
        return Err(RpcError::bad_request("You cannot change your own ban status"));
    }
    let mut patch = Row::new();
    patch.insert("banned".to_string(), Value::Bool(input.banned));
    let Some(row) = ctx.db.update(USERS, &input.user_id, patch).await? else {
        return Err(user_not_found(&input.user_id));
    };
    log::warn!(
        "admin {} set banned={} on user {}",
        ctx.session.user.id,
        input.banned,
        input.user_id
    );
    Ok(from_row(row)?)
}

/// Issues a session for another user. The caller's client must switch its
/// cache identity to the returned user.
async fn impersonate(ctx: AuthenticatedContext, input: Impersonate) -> RpcResult<Impersonation> {
    let Some(row) = ctx.db.find_one(USERS, &Filter::by_id(&input.user_id)).await? else {
        return Err(user_not_found(&input.user_id));
    };
    let user: SessionUser = from_row(row)?;
    let admin_id = ctx.session.user.id.clone();
    let token = issue_session(&ctx.db, &user.id, Some(admin_id.clone())).await?;
    log::warn!("admin {admin_id} is impersonating user {}", user.id);
    Ok(Impersonation { token, user })
}

async fn impersonations(
    ctx: AuthenticatedContext,
    _input: (),
) -> RpcResult<Vec<ImpersonationRecord>> {
    let mut out = Vec::new();
    for row in ctx.db.select(SESSIONS, &Filter::all()).await? {
        let session: SessionRecord = from_row(row)?;
        if let Some(admin_id) = session.impersonated_by {
            out.push(ImpersonationRecord {
                session_id: session.id,
                user_id: session.user_id,
                impersonated_by: admin_id,
            });
        }
    }
    Ok(out)
}

fn user_not_found(id: &str) -> RpcError {
    RpcError::not_found(format!("User {id} not found"))
}
