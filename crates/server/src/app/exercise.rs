use kata_rpc::{
    from_row, to_row, AuthenticatedContext, Filter, Issues, Pipeline, PublicContext, Row,
    RouterBuilder, RpcError, RpcResult, Validate,
};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::{unix_ms_now, Difficulty, Exercise, EXERCISES};

const MAX_TITLE_CHARS: usize = 120;
const MAX_DESCRIPTION_CHARS: usize = 10_000;
const MAX_TAGS: usize = 10;

static SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid slug regex"));

pub fn router(pipeline: &Pipeline) -> RouterBuilder {
    RouterBuilder::new()
        .procedure("list", pipeline.public().query(list))
        .procedure("byId", pipeline.public().query(by_id))
        .procedure("create", pipeline.protected().mutation(create))
        .procedure("update", pipeline.protected().mutation(update))
        .procedure("delete", pipeline.protected().mutation(delete))
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListExercises {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl Validate for ListExercises {}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExerciseId {
    pub id: String,
}

impl Validate for ExerciseId {
    fn validate(&self, issues: &mut Issues) {
        issues.require_non_empty("id", &self.id);
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateExercise {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Validate for CreateExercise {
    fn validate(&self, issues: &mut Issues) {
        issues.check(
            SLUG.is_match(&self.slug),
            "slug",
            "format",
            "must be lowercase letters and digits separated by single dashes",
        );
        issues.require_non_empty("title", &self.title);
        issues.max_chars("title", &self.title, MAX_TITLE_CHARS);
        issues.max_chars("description", &self.description, MAX_DESCRIPTION_CHARS);
        check_tags(issues, &self.tags);
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateExercise {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl Validate for UpdateExercise {
    fn validate(&self, issues: &mut Issues) {
        issues.require_non_empty("id", &self.id);
        if let Some(title) = &self.title {
            issues.require_non_empty("title", title);
            issues.max_chars("title", title, MAX_TITLE_CHARS);
        }
        if let Some(description) = &self.description {
            issues.max_chars("description", description, MAX_DESCRIPTION_CHARS);
        }
        if let Some(tags) = &self.tags {
            check_tags(issues, tags);
        }
    }
}

fn check_tags(issues: &mut Issues, tags: &[String]) {
    issues.check(tags.len() <= MAX_TAGS, "tags", "too_many", "at most 10 tags");
    issues.check(
        tags.iter().all(|t| SLUG.is_match(t)),
        "tags",
        "format",
        "tags must be lowercase slugs",
    );
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

async fn list(ctx: PublicContext, input: ListExercises) -> RpcResult<Vec<Exercise>> {
    let rows = ctx.db.select(EXERCISES, &Filter::all()).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let exercise: Exercise = from_row(row)?;
        if input.difficulty.is_some_and(|d| d != exercise.difficulty) {
            continue;
        }
        if let Some(tag) = &input.tag {
            if !exercise.tags.contains(tag) {
                continue;
            }
        }
        out.push(exercise);
    }
    Ok(out)
}

async fn by_id(ctx: PublicContext, input: ExerciseId) -> RpcResult<Exercise> {
    let row = ctx.db.find_one(EXERCISES, &Filter::by_id(&input.id)).await?;
    match row {
        Some(row) => Ok(from_row(row)?),
        None => Err(not_found(&input.id)),
    }
}

async fn create(ctx: AuthenticatedContext, input: CreateExercise) -> RpcResult<Exercise> {
    // Check-then-insert; two racing creates with one slug can both pass.
    let taken = ctx
        .db
        .find_one(EXERCISES, &Filter::all().eq("slug", input.slug.as_str()))
        .await?;
    if taken.is_some() {
        return Err(RpcError::bad_request(format!(
            "An exercise with slug {} already exists",
            input.slug
        )));
    }
    let exercise = Exercise {
        id: String::new(),
        slug: input.slug,
        title: input.title,
        description: input.description,
        difficulty: input.difficulty,
        tags: input.tags,
        author_id: ctx.session.user.id.clone(),
        created_ms: unix_ms_now(),
    };
    let row = ctx.db.insert(EXERCISES, to_row(&exercise)?).await?;
    let created: Exercise = from_row(row)?;
    log::info!("exercise {} created by {}", created.id, created.author_id);
    Ok(created)
}

async fn update(ctx: AuthenticatedContext, input: UpdateExercise) -> RpcResult<Exercise> {
    load_editable(&ctx, &input.id).await?;
    let mut patch = Row::new();
    if let Some(title) = input.title {
        patch.insert("title".to_string(), Value::String(title));
    }
    if let Some(description) = input.description {
        patch.insert("description".to_string(), Value::String(description));
    }
    if let Some(difficulty) = input.difficulty {
        patch.insert("difficulty".to_string(), serde_json::to_value(difficulty)?);
    }
    if let Some(tags) = input.tags {
        patch.insert("tags".to_string(), serde_json::to_value(tags)?);
    }
    match ctx.db.update(EXERCISES, &input.id, patch).await? {
        Some(row) => Ok(from_row(row)?),
        None => Err(not_found(&input.id)),
    }
}

async fn delete(ctx: AuthenticatedContext, input: ExerciseId) -> RpcResult<Deleted> {
    load_editable(&ctx, &input.id).await?;
    let deleted = ctx.db.delete(EXERCISES, &input.id).await?;
    Ok(Deleted { deleted })
}

/// Only the author or an admin may change an exercise.
async fn load_editable(ctx: &AuthenticatedContext, id: &str) -> RpcResult<Exercise> {
    let Some(row) = ctx.db.find_one(EXERCISES, &Filter::by_id(id)).await? else {
        return Err(not_found(id));
    };
    let exercise: Exercise = from_row(row)?;
    let user = &ctx.session.user;
    if exercise.author_id != user.id && !user.is_admin() {
        return Err(RpcError::forbidden("Only the author can change this exercise"));
    }
    Ok(exercise)
}

fn not_found(id: &str) -> RpcError {
    RpcError::not_found(format!("Exercise {id} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kata_protocol::ErrorCode;
    use kata_rpc::validate::parse_input;
    use serde_json::json;

    #[test]
    fn create_input_rules() {
        let ok = parse_input::<CreateExercise>(json!({
            "slug": "two-sum",
            "title": "Two sum",
            "description": "",
            "difficulty": "easy",
            "tags": ["arrays"]
        }))
        .unwrap();
        assert_eq!(ok.difficulty, Difficulty::Easy);

        let err = parse_input::<CreateExercise>(json!({
            "slug": "Two Sum",
            "title": " ",
            "description": "",
            "difficulty": "easy"
        }))
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
        let details = err.to_envelope().details.unwrap();
        let fields: Vec<&str> = details
            .as_array()
            .unwrap()
            .iter()
            .map(|issue| issue["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, ["slug", "title"]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(parse_input::<ExerciseId>(json!({ "id": "1", "extra": true })).is_err());
        assert!(parse_input::<ListExercises>(json!({})).is_ok());
    }
}
