//! Team endpoints and their wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::ApiClient;
use super::error::ApiResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
struct TeamPayload<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct TeamsResponse {
    pub teams: Vec<Team>,
}

#[derive(Debug, Deserialize)]
pub struct TeamResponse {
    pub team: Team,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamResponse {
    pub success: bool,
    pub team_id: i64,
    pub message: String,
}

/// Response envelope for team updates and deletions.
#[derive(Debug, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

impl ApiClient {
    /// List the teams the signed-in member belongs to.
    pub async fn my_teams(&self) -> ApiResult<TeamsResponse> {
        self.get("/api/me/teams").await
    }

    pub async fn create_team(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> ApiResult<CreateTeamResponse> {
        self.post("/api/me/teams", &TeamPayload { name, description })
            .await
    }

    pub async fn team(&self, team_id: i64) -> ApiResult<TeamResponse> {
        self.get(&format!("/api/teams/{team_id}")).await
    }

    pub async fn update_team(
        &self,
        team_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> ApiResult<AckResponse> {
        self.patch(
            &format!("/api/teams/{team_id}"),
            &TeamPayload { name, description },
        )
        .await
    }

    pub async fn delete_team(&self, team_id: i64) -> ApiResult<AckResponse> {
        self.delete(&format!("/api/teams/{team_id}")).await
    }
}
