use kata_rpc::{
    from_row, to_row, AuthenticatedContext, Filter, Issues, Pipeline, RouterBuilder, RpcError,
    RpcResult, Validate,
};
use schemars::JsonSchema;
use serde::Deserialize;

use super::models::{unix_ms_now, Submission, EXERCISES, SUBMISSIONS};

const MAX_ANSWER_CHARS: usize = 20_000;

pub fn router(pipeline: &Pipeline) -> RouterBuilder {
    RouterBuilder::new()
        .procedure("create", pipeline.protected().mutation(create))
        .procedure("mine", pipeline.protected().query(mine))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateSubmission {
    pub exercise_id: String,
    pub answer: String,
}

impl Validate for CreateSubmission {
    fn validate(&self, issues: &mut Issues) {
        issues.require_non_empty("exerciseId", &self.exercise_id);
        issues.require_non_empty("answer", &self.answer);
        issues.max_chars("answer", &self.answer, MAX_ANSWER_CHARS);
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MySubmissions {
    #[serde(default)]
    pub exercise_id: Option<String>,
}

impl Validate for MySubmissions {}

async fn create(ctx: AuthenticatedContext, input: CreateSubmission) -> RpcResult<Submission> {
    let exercise = ctx
        .db
        .find_one(EXERCISES, &Filter::by_id(&input.exercise_id))
        .await?;
    if exercise.is_none() {
        return Err(RpcError::not_found(format!(
            "Exercise {} not found",
            input.exercise_id
        )));
    }
    let submission = Submission {
        id: String::new(),
        exercise_id: input.exercise_id,
        user_id: ctx.session.user.id.clone(),
        answer: input.answer,
        created_ms: unix_ms_now(),
    };
    let row = ctx.db.insert(SUBMISSIONS, to_row(&submission)?).await?;
    Ok(from_row(row)?)
}

/// The caller's submissions, newest first.
async fn mine(ctx: AuthenticatedContext, input: MySubmissions) -> RpcResult<Vec<Submission>> {
    let mut filter = Filter::all().eq("userId", ctx.session.user.id.as_str());
    if let Some(exercise_id) = input.exercise_id {
        filter = filter.eq("exerciseId", exercise_id);
    }
    let mut out = ctx
        .db
        .select(SUBMISSIONS, &filter)
        .await?
        .into_iter()
        .map(from_row::<Submission>)
        .collect::<Result<Vec<_>, _>>()?;
    out.reverse();
    Ok(out)
}
