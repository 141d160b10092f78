//! Recipe catalog.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::path_segment;
use crate::http::{ApiClient, ApiError, RequestOptions};

/// Where the backend should look for recipes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeSource {
    #[default]
    Local,
    #[serde(rename = "recipedb")]
    RecipeDb,
    Ai,
}

impl RecipeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::RecipeDb => "recipedb",
            Self::Ai => "ai",
        }
    }
}

impl fmt::Display for RecipeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStep")]
pub struct RecipeStep {
    pub step_number: u32,
    pub title: String,
    pub instruction: String,
    pub duration_seconds: Option<u32>,
    pub timer_required: bool,
    pub tips: Vec<String>,
}

/// A recipe, normalized across the backend's field spellings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRecipe")]
pub struct Recipe {
    pub id: String,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub difficulty: String,
    pub prep_time_minutes: u32,
    pub cook_time_minutes: u32,
    pub servings: u32,
    pub ingredients: Vec<serde_json::Value>,
    pub steps: Vec<RecipeStep>,
    pub tags: Vec<String>,
}

/// `GET /recipes` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecipeList {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub data: Vec<Recipe>,
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(default)]
    step_number: Option<u32>,
    #[serde(default, rename = "stepNumber")]
    step_number_camel: Option<u32>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    duration_minutes: Option<u32>,
    #[serde(default)]
    duration_seconds: Option<u32>,
    #[serde(default)]
    timer_required: bool,
    #[serde(default)]
    ai_tips: Option<String>,
    #[serde(default)]
    tips: Vec<String>,
}

impl From<RawStep> for RecipeStep {
    fn from(raw: RawStep) -> Self {
        let step_number = raw.step_number.or(raw.step_number_camel).unwrap_or_default();
        let tips = match raw.ai_tips.filter(|t| !t.is_empty()) {
            Some(tip) => vec![tip],
            None => raw.tips,
        };

        Self {
            step_number,
            title: raw
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Step {}", step_number)),
            instruction: raw.instruction.unwrap_or_default(),
            duration_seconds: raw
                .duration_seconds
                .or(raw.duration_minutes.map(|m| m * 60)),
            timer_required: raw.timer_required,
            tips,
        }
    }
}

#[derive(Deserialize)]
struct RawRecipe {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    recipe_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    prep_time_minutes: Option<u32>,
    #[serde(default)]
    prep_time: Option<u32>,
    #[serde(default)]
    cook_time_minutes: Option<u32>,
    #[serde(default)]
    cook_time: Option<u32>,
    #[serde(default)]
    servings: Option<u32>,
    #[serde(default)]
    ingredients: Vec<serde_json::Value>,
    #[serde(default)]
    steps: Vec<RecipeStep>,
    #[serde(default)]
    tags: Vec<String>,
}

fn first_non_empty(a: Option<String>, b: Option<String>) -> String {
    a.filter(|s| !s.is_empty())
        .or(b.filter(|s| !s.is_empty()))
        .unwrap_or_default()
}

impl From<RawRecipe> for Recipe {
    fn from(raw: RawRecipe) -> Self {
        Self {
            id: first_non_empty(raw.id, raw.recipe_id),
            title: first_non_empty(raw.title, raw.name),
            description: raw.description.unwrap_or_default(),
            image_url: raw.image_url.filter(|u| !u.is_empty()),
            difficulty: raw
                .difficulty
                .unwrap_or_else(|| "BEGINNER".to_string()),
            prep_time_minutes: raw.prep_time_minutes.or(raw.prep_time).unwrap_or_default(),
            cook_time_minutes: raw.cook_time_minutes.or(raw.cook_time).unwrap_or_default(),
            servings: raw.servings.filter(|s| *s > 0).unwrap_or(2),
            ingredients: raw.ingredients,
            steps: raw.steps,
            tags: raw.tags,
        }
    }
}

/// Recipe list and detail endpoints.
#[derive(Clone)]
pub struct RecipeService {
    client: ApiClient,
}

impl RecipeService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Search recipes. A blank query lists everything from `source`.
    pub async fn list_recipes(
        &self,
        query: Option<&str>,
        source: RecipeSource,
    ) -> Result<RecipeList, ApiError> {
        let mut options = RequestOptions::new().query("source", source.as_str());
        if let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) {
            options = options.query("query", query);
        }
        self.client.get_json("/recipes", options).await
    }

    pub async fn get_recipe(&self, recipe_id: &str) -> Result<Recipe, ApiError> {
        let path = format!("/recipes/{}", path_segment(recipe_id));
        self.client.get_json(&path, RequestOptions::new()).await
    }
}
