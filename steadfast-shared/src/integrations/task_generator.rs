/// AI task generation
///
/// A [`TaskGenerator`] proposes habit-building tasks for a user. The default
/// [`TemplateTaskGenerator`] draws from a fixed template catalogue and attaches
/// a random confidence in `[0.70, 0.99]`; it does no inference.
///
/// # Example
///
/// ```
/// use steadfast_shared::integrations::{GenerationRequest, TaskGenerator, TemplateTaskGenerator};
/// use steadfast_shared::models::task::TaskCategory;
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let generator = TemplateTaskGenerator::new();
/// let tasks = generator
///     .generate(&GenerationRequest {
///         user_id: Uuid::new_v4(),
///         count: 3,
///         category: Some(TaskCategory::Mindfulness),
///     })
///     .await?;
///
/// assert_eq!(tasks.len(), 3);
/// assert!(tasks.iter().all(|t| t.category == TaskCategory::Mindfulness));
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::models::task::{TaskCategory, TaskPriority};

/// Lowest confidence attached by the template generator
pub const MIN_CONFIDENCE: f64 = 0.70;

/// Highest confidence attached by the template generator
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Largest batch a single request may ask for
pub const MAX_GENERATED: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("Task generator unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub user_id: Uuid,
    pub count: usize,

    /// Restricts output to one category; mixed when `None`
    pub category: Option<TaskCategory>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTask {
    pub title: String,
    pub description: String,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub confidence: f64,
}

#[async_trait]
pub trait TaskGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedTask>, GeneratorError>;
}

struct Template {
    category: TaskCategory,
    title: &'static str,
    description: &'static str,
    priority: TaskPriority,
}

const TEMPLATES: &[Template] = &[
    Template {
        category: TaskCategory::Health,
        title: "Drink eight glasses of water",
        description: "Keep a bottle nearby and refill it through the day.",
        priority: TaskPriority::Medium,
    },
    Template {
        category: TaskCategory::Health,
        title: "Get to bed before 11pm",
        description: "Put screens away thirty minutes before sleeping.",
        priority: TaskPriority::High,
    },
    Template {
        category: TaskCategory::Mindfulness,
        title: "Ten minutes of guided breathing",
        description: "Sit somewhere quiet and follow a slow four-count breath.",
        priority: TaskPriority::Medium,
    },
    Template {
        category: TaskCategory::Mindfulness,
        title: "Write down three things you are grateful for",
        description: "Keep the list short and specific to today.",
        priority: TaskPriority::Low,
    },
    Template {
        category: TaskCategory::Mindfulness,
        title: "Notice and name a craving",
        description: "When an urge appears, label it and wait five minutes before acting.",
        priority: TaskPriority::High,
    },
    Template {
        category: TaskCategory::Fitness,
        title: "Take a twenty minute walk",
        description: "Any pace counts. Outside if the weather allows.",
        priority: TaskPriority::Medium,
    },
    Template {
        category: TaskCategory::Fitness,
        title: "Stretch for ten minutes",
        description: "Focus on the neck, shoulders and lower back.",
        priority: TaskPriority::Low,
    },
    Template {
        category: TaskCategory::Social,
        title: "Call a friend or family member",
        description: "A short check-in is enough.",
        priority: TaskPriority::Medium,
    },
    Template {
        category: TaskCategory::Social,
        title: "Attend a support group meeting",
        description: "In person or online.",
        priority: TaskPriority::High,
    },
    Template {
        category: TaskCategory::Learning,
        title: "Read for fifteen minutes",
        description: "Pick something unrelated to work.",
        priority: TaskPriority::Low,
    },
    Template {
        category: TaskCategory::Learning,
        title: "Learn about one coping technique",
        description: "Read or watch a short explainer and note one idea to try.",
        priority: TaskPriority::Medium,
    },
    Template {
        category: TaskCategory::Productivity,
        title: "Plan tomorrow in five lines",
        description: "List the three most important tasks and one thing to avoid.",
        priority: TaskPriority::Medium,
    },
    Template {
        category: TaskCategory::Productivity,
        title: "Clear one small backlog item",
        description: "Choose something that takes under fifteen minutes.",
        priority: TaskPriority::Low,
    },
    Template {
        category: TaskCategory::Other,
        title: "Spend thirty minutes on a hobby",
        description: "Do something you enjoy for its own sake.",
        priority: TaskPriority::Low,
    },
];

/// Template-based generator with simulated confidence scores
#[derive(Debug, Clone, Default)]
pub struct TemplateTaskGenerator;

impl TemplateTaskGenerator {
    pub fn new() -> Self {
        TemplateTaskGenerator
    }

    fn pick(&self, request: &GenerationRequest) -> Vec<GeneratedTask> {
        let mut rng = rand::thread_rng();

        let candidates: Vec<&Template> = TEMPLATES
            .iter()
            .filter(|t| request.category.map_or(true, |c| t.category == c))
            .collect();

        let mut tasks = Vec::with_capacity(request.count);
        for _ in 0..request.count {
            let Some(template) = candidates.choose(&mut rng) else {
                break;
            };
            tasks.push(GeneratedTask {
                title: template.title.to_string(),
                description: template.description.to_string(),
                category: template.category,
                priority: template.priority,
                confidence: round2(rng.gen_range(MIN_CONFIDENCE..=MAX_CONFIDENCE)),
            });
        }
        tasks
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl TaskGenerator for TemplateTaskGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedTask>, GeneratorError> {
        if request.count == 0 || request.count > MAX_GENERATED {
            return Err(GeneratorError::InvalidRequest(format!(
                "count must be between 1 and {}",
                MAX_GENERATED
            )));
        }

        let tasks = self.pick(request);
        tracing::debug!(
            user_id = %request.user_id,
            generated = tasks.len(),
            generator = self.name(),
            "Generated tasks"
        );
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(count: usize, category: Option<TaskCategory>) -> GenerationRequest {
        GenerationRequest {
            user_id: Uuid::new_v4(),
            count,
            category,
        }
    }

    #[test]
    fn test_every_category_has_a_template() {
        for category in TaskCategory::ALL {
            assert!(
                TEMPLATES.iter().any(|t| t.category == *category),
                "no template for {}",
                category
            );
        }
    }

    #[tokio::test]
    async fn test_confidence_is_bounded() {
        let generator = TemplateTaskGenerator::new();
        for _ in 0..20 {
            let tasks = generator.generate(&request(10, None)).await.unwrap();
            assert_eq!(tasks.len(), 10);
            for task in tasks {
                assert!(task.confidence >= MIN_CONFIDENCE && task.confidence <= MAX_CONFIDENCE);
            }
        }
    }

    #[tokio::test]
    async fn test_category_is_respected() {
        let generator = TemplateTaskGenerator::new();
        let tasks = generator
            .generate(&request(5, Some(TaskCategory::Fitness)))
            .await
            .unwrap();
        assert!(tasks.iter().all(|t| t.category == TaskCategory::Fitness));
    }

    #[tokio::test]
    async fn test_count_out_of_range() {
        let generator = TemplateTaskGenerator::new();
        assert!(generator.generate(&request(0, None)).await.is_err());
        assert!(generator.generate(&request(11, None)).await.is_err());
    }
}
