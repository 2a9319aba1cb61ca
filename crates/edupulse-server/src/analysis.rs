//! Heuristic assignment analysis
//!
//! Produces a reading-level difficulty, an effort estimate, the skills the
//! prompt exercises and a milestone plan. Deterministic: the same
//! description always yields the same analysis.

use crate::models::Difficulty;

/// Milestone produced by the analyzer before it is persisted
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMilestone {
    pub title: String,
    pub description: String,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub word_count: i32,
    pub difficulty: Difficulty,
    pub estimated_hours: f64,
    pub skills: Vec<String>,
    pub milestones: Vec<PlannedMilestone>,
}

const SKILL_KEYWORDS: &[(&str, &[&str])] = &[
    ("research", &["research", "sources", "cite", "citation", "bibliography", "literature"]),
    ("writing", &["essay", "write", "report", "paragraph", "draft", "thesis"]),
    ("analysis", &["analyze", "analyse", "compare", "contrast", "evaluate", "critique"]),
    ("mathematics", &["calculate", "equation", "proof", "derive", "solve", "formula"]),
    ("programming", &["code", "program", "function", "algorithm", "implement", "debug"]),
    ("data", &["data", "dataset", "chart", "graph", "statistics", "survey"]),
    ("presentation", &["present", "presentation", "slides", "poster", "speech"]),
    ("collaboration", &["group", "team", "peer", "partner", "collaborate"]),
];

const MILESTONE_POINTS: i32 = 15;

pub fn analyze(description: &str) -> Analysis {
    let words: Vec<String> = description
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();

    let word_count = words.len() as i32;
    let sentences = description
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);

    let avg_sentence_len = words.len() as f64 / sentences as f64;
    let long_words = words.iter().filter(|w| w.chars().count() >= 9).count();
    let long_ratio = if words.is_empty() {
        0.0
    } else {
        long_words as f64 / words.len() as f64
    };

    let skills: Vec<String> = SKILL_KEYWORDS
        .iter()
        .filter(|(_, keys)| {
            words
                .iter()
                .any(|w| keys.iter().any(|k| w.starts_with(k)))
        })
        .map(|(skill, _)| skill.to_string())
        .collect();

    let complexity = avg_sentence_len / 10.0 + long_ratio * 10.0 + skills.len() as f64 * 0.5;
    let difficulty = if complexity >= 4.0 {
        Difficulty::Advanced
    } else if complexity >= 2.5 {
        Difficulty::Intermediate
    } else {
        Difficulty::Introductory
    };

    let multiplier = match difficulty {
        Difficulty::Introductory => 1.0,
        Difficulty::Intermediate => 1.5,
        Difficulty::Advanced => 2.0,
    };
    let base_hours = 1.0 + word_count as f64 / 150.0 + skills.len() as f64 * 0.5;
    let estimated_hours = ((base_hours * multiplier) * 2.0).round() / 2.0;

    let milestones = plan_milestones(&skills);

    Analysis {
        word_count,
        difficulty,
        estimated_hours,
        skills,
        milestones,
    }
}

fn plan_milestones(skills: &[String]) -> Vec<PlannedMilestone> {
    let mut steps = vec![PlannedMilestone {
        title: "Understand the brief".to_string(),
        description: "Read the assignment and list what must be delivered".to_string(),
        points: MILESTONE_POINTS,
    }];

    for skill in skills {
        let (title, description) = match skill.as_str() {
            "research" => ("Gather sources", "Collect and note the sources you will cite"),
            "analysis" => ("Analyze the material", "Compare the key ideas and record findings"),
            "mathematics" => ("Work the problems", "Solve each problem and check the results"),
            "programming" => ("Build the solution", "Implement and test the program"),
            "data" => ("Prepare the data", "Collect, clean and chart the data"),
            "presentation" => ("Prepare the presentation", "Draft slides or visual material"),
            "collaboration" => ("Coordinate with your group", "Split the work and agree on deadlines"),
            "writing" => ("Write a first draft", "Write the full draft without polishing"),
            _ => continue,
        };
        steps.push(PlannedMilestone {
            title: title.to_string(),
            description: description.to_string(),
            points: MILESTONE_POINTS,
        });
    }

    steps.push(PlannedMilestone {
        title: "Review and submit".to_string(),
        description: "Proofread, check requirements and submit".to_string(),
        points: MILESTONE_POINTS,
    });
    steps
}
