use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::Auth;
use crate::models::team::Team;

pub async fn get_team(
    State(pool): State<Arc<PgPool>>,
    State(auth): State<Arc<Auth>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Team>, StatusCode> {
    auth.require_user()?;
    let team = sqlx::query_as!(Team, "SELECT * FROM teams WHERE id = $1", id)
        .fetch_one(&**pool)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(team))
}

pub async fn list_teams(State(pool): State<Arc<PgPool>>) -> Result<Json<Vec<Team>>, StatusCode> {
    let teams = sqlx::query_as!(Team, "SELECT * FROM teams")
        .fetch_all(&*pool)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(teams))
}
