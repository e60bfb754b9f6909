use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use crate::api::AppState;
use uuid::Uuid;

use crate::models::team::Team;

pub async fn get_team(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Team>, StatusCode> {
    state.auth.require_user()?;
    let team = sqlx::query_as!(Team, "SELECT * FROM teams WHERE id = $1", id)
        .fetch_one(&*state.pool)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(team))
}

pub async fn list_teams(State(state): State<AppState>) -> Result<Json<Vec<Team>>, StatusCode> {
    let teams = sqlx::query_as!(Team, "SELECT * FROM teams")
        .fetch_all(&*state.pool)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(teams))
}
