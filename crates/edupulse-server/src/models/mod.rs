//! Data models for the EduPulse API

use serde::{Deserialize, Serialize};

// ============================================================================
// USERS & AUTH
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Teachers and admins manage course content.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Teacher | Role::Admin)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role::parse(s).unwrap_or(Role::Student)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token expiry (unix seconds)
    pub expires_at: i64,
    /// Refresh token expiry (unix seconds)
    pub refresh_expires_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: User,
    pub tokens: TokenPair,
}

/// JWT claims carried by access tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Server-side refresh session
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub id: String,
    pub user_id: String,
    pub expires_at: i64,
    pub revoked: bool,
}

// ============================================================================
// ASSIGNMENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub teacher_id: String,
    pub title: String,
    pub description: String,
    pub subject: Option<String>,
    pub due_at: Option<i64>,
    pub max_points: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAssignmentRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub subject: Option<String>,
    pub due_at: Option<i64>,
    pub max_points: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAssignmentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub due_at: Option<i64>,
    pub max_points: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSubmission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub content: String,
    pub submitted_at: i64,
    pub score: Option<i32>,
    pub feedback: Option<String>,
    pub graded_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitAssignmentRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradeSubmissionRequest {
    pub score: Option<i32>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Introductory,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Introductory => "introductory",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl From<&str> for Difficulty {
    fn from(s: &str) -> Self {
        match s {
            "advanced" => Difficulty::Advanced,
            "intermediate" => Difficulty::Intermediate,
            _ => Difficulty::Introductory,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub assignment_id: String,
    pub word_count: i32,
    pub difficulty: Difficulty,
    pub estimated_hours: f64,
    pub skills: Vec<String>,
    pub milestones: Vec<Milestone>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub assignment_id: String,
    pub position: i32,
    pub title: String,
    pub description: String,
    pub points: i32,
}

// ============================================================================
// PATHWAYS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pathway {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_by: String,
    pub created_at: i64,
    pub checkpoints: Vec<Checkpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathwaySummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub checkpoint_count: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub pathway_id: String,
    pub position: i32,
    pub title: String,
    pub description: String,
    pub points: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCheckpoint {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub points: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePathwayRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub checkpoints: Vec<NewCheckpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathwayProgress {
    pub pathway_id: String,
    pub user_id: String,
    pub completed_checkpoints: i64,
    pub total_checkpoints: i64,
    pub percent: i64,
    pub enrolled_at: i64,
    pub completed_at: Option<i64>,
}

impl PathwayProgress {
    pub fn percent_of(completed: i64, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        (completed.min(total) * 100) / total
    }
}

// ============================================================================
// POINTS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PointsAction {
    AssignmentSubmitted,
    EarlySubmission,
    MilestoneCompleted,
    CheckpointCompleted,
    PathwayCompleted,
    TutorSessionCompleted,
    AchievementUnlocked,
    ManualAward,
    Redemption,
}

impl PointsAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointsAction::AssignmentSubmitted => "assignment_submitted",
            PointsAction::EarlySubmission => "early_submission",
            PointsAction::MilestoneCompleted => "milestone_completed",
            PointsAction::CheckpointCompleted => "checkpoint_completed",
            PointsAction::PathwayCompleted => "pathway_completed",
            PointsAction::TutorSessionCompleted => "tutor_session_completed",
            PointsAction::AchievementUnlocked => "achievement_unlocked",
            PointsAction::ManualAward => "manual_award",
            PointsAction::Redemption => "redemption",
        }
    }

    /// Fixed award for actions with a standard value.
    /// Actions whose amount depends on the source return `None`.
    pub fn base_points(&self) -> Option<i64> {
        match self {
            PointsAction::AssignmentSubmitted => Some(50),
            PointsAction::EarlySubmission => Some(25),
            PointsAction::MilestoneCompleted => Some(15),
            PointsAction::PathwayCompleted => Some(100),
            PointsAction::TutorSessionCompleted => Some(10),
            PointsAction::CheckpointCompleted
            | PointsAction::AchievementUnlocked
            | PointsAction::ManualAward
            | PointsAction::Redemption => None,
        }
    }

    /// Actions triggered directly by the learner go through rate limiting
    /// and fraud scoring.
    pub fn is_user_driven(&self) -> bool {
        !matches!(
            self,
            PointsAction::AchievementUnlocked | PointsAction::ManualAward | PointsAction::Redemption
        )
    }

    /// Learner actions count toward the daily cap and fraud velocity.
    /// Staff grants and achievement rewards do not.
    pub fn counts_toward_daily_cap(&self) -> bool {
        self.is_user_driven()
    }

    pub const ALL: [PointsAction; 9] = [
        PointsAction::AssignmentSubmitted,
        PointsAction::EarlySubmission,
        PointsAction::MilestoneCompleted,
        PointsAction::CheckpointCompleted,
        PointsAction::PathwayCompleted,
        PointsAction::TutorSessionCompleted,
        PointsAction::AchievementUnlocked,
        PointsAction::ManualAward,
        PointsAction::Redemption,
    ];

    /// Stored names of the actions that count toward the daily cap
    pub fn daily_cap_actions() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|a| a.counts_toward_daily_cap())
            .map(PointsAction::as_str)
            .collect()
    }
}

impl From<&str> for PointsAction {
    fn from(s: &str) -> Self {
        match s {
            "assignment_submitted" => PointsAction::AssignmentSubmitted,
            "early_submission" => PointsAction::EarlySubmission,
            "milestone_completed" => PointsAction::MilestoneCompleted,
            "checkpoint_completed" => PointsAction::CheckpointCompleted,
            "pathway_completed" => PointsAction::PathwayCompleted,
            "tutor_session_completed" => PointsAction::TutorSessionCompleted,
            "achievement_unlocked" => PointsAction::AchievementUnlocked,
            "redemption" => PointsAction::Redemption,
            _ => PointsAction::ManualAward,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub id: String,
    pub user_id: String,
    pub action: PointsAction,
    pub amount: i64,
    pub balance_after: i64,
    pub source_id: Option<String>,
    pub description: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointsBalance {
    pub user_id: String,
    pub balance: i64,
    pub lifetime_earned: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub name: String,
    pub balance: i64,
    pub lifetime_earned: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManualAwardRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedeemRequest {
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub reward: String,
}

/// Result of a points award attempt
#[derive(Debug, Clone, Serialize)]
pub struct AwardOutcome {
    /// `None` when the daily cap absorbed the whole award
    pub transaction: Option<PointsTransaction>,
    pub requested: i64,
    pub awarded: i64,
    pub capped: bool,
    pub unlocked: Vec<Achievement>,
}

// ============================================================================
// FRAUD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudLog {
    pub id: String,
    pub user_id: String,
    pub action: PointsAction,
    pub amount: i64,
    pub score: i32,
    pub reasons: Vec<String>,
    pub blocked: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudUserCount {
    pub user_id: String,
    pub flags: i64,
    pub blocked: i64,
    pub max_score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FraudSummary {
    pub total: i64,
    pub flagged: i64,
    pub blocked: i64,
    pub by_reason: std::collections::BTreeMap<String, i64>,
    pub top_users: Vec<FraudUserCount>,
}

// ============================================================================
// ACHIEVEMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AchievementMetric {
    LifetimePoints,
    Submissions,
    MilestonesCompleted,
    CheckpointsCompleted,
    PathwaysCompleted,
    TutoringSessions,
}

impl AchievementMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementMetric::LifetimePoints => "lifetime_points",
            AchievementMetric::Submissions => "submissions",
            AchievementMetric::MilestonesCompleted => "milestones_completed",
            AchievementMetric::CheckpointsCompleted => "checkpoints_completed",
            AchievementMetric::PathwaysCompleted => "pathways_completed",
            AchievementMetric::TutoringSessions => "tutoring_sessions",
        }
    }
}

impl From<&str> for AchievementMetric {
    fn from(s: &str) -> Self {
        match s {
            "submissions" => AchievementMetric::Submissions,
            "milestones_completed" => AchievementMetric::MilestonesCompleted,
            "checkpoints_completed" => AchievementMetric::CheckpointsCompleted,
            "pathways_completed" => AchievementMetric::PathwaysCompleted,
            "tutoring_sessions" => AchievementMetric::TutoringSessions,
            _ => AchievementMetric::LifetimePoints,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Achievement {
    pub code: String,
    pub name: String,
    pub description: String,
    pub metric: AchievementMetric,
    pub threshold: i64,
    pub reward_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub unlocked_at: Option<i64>,
    pub progress: i64,
}

/// Counters the achievement rules are evaluated against
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserStats {
    pub lifetime_points: i64,
    pub submissions: i64,
    pub milestones_completed: i64,
    pub checkpoints_completed: i64,
    pub pathways_completed: i64,
    pub tutoring_sessions: i64,
}

// ============================================================================
// TUTORING
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TutoringStatus {
    Active,
    Ended,
}

impl From<&str> for TutoringStatus {
    fn from(s: &str) -> Self {
        match s {
            "ended" => TutoringStatus::Ended,
            _ => TutoringStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutoringSession {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub assignment_id: Option<String>,
    pub status: TutoringStatus,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    Student,
    Tutor,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSender::Student => "student",
            MessageSender::Tutor => "tutor",
        }
    }
}

impl From<&str> for MessageSender {
    fn from(s: &str) -> Self {
        match s {
            "tutor" => MessageSender::Tutor,
            _ => MessageSender::Student,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutoringMessage {
    pub id: String,
    pub session_id: String,
    pub sender: MessageSender,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartTutoringRequest {
    #[serde(default)]
    pub subject: String,
    pub assignment_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TutoringMessageRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TutoringExchange {
    pub question: TutoringMessage,
    pub answer: TutoringMessage,
}

// ============================================================================
// ACADEMIC INTEGRITY
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Plagiarism,
    Collusion,
    AiGenerated,
    Other,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Plagiarism => "plagiarism",
            ReportKind::Collusion => "collusion",
            ReportKind::AiGenerated => "ai_generated",
            ReportKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plagiarism" => Some(ReportKind::Plagiarism),
            "collusion" => Some(ReportKind::Collusion),
            "ai_generated" => Some(ReportKind::AiGenerated),
            "other" => Some(ReportKind::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    Investigating,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "open",
            ReportStatus::Investigating => "investigating",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ReportStatus::Open),
            "investigating" => Some(ReportStatus::Investigating),
            "resolved" => Some(ReportStatus::Resolved),
            "dismissed" => Some(ReportStatus::Dismissed),
            _ => None,
        }
    }

    /// Allowed review workflow moves
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (ReportStatus::Open, ReportStatus::Investigating)
                | (ReportStatus::Open, ReportStatus::Dismissed)
                | (ReportStatus::Investigating, ReportStatus::Resolved)
                | (ReportStatus::Investigating, ReportStatus::Dismissed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub id: String,
    pub submission_id: String,
    /// `None` when opened automatically by the similarity check
    pub reporter_id: Option<String>,
    pub kind: ReportKind,
    pub status: ReportStatus,
    pub description: String,
    pub resolution: Option<String>,
    pub similarity: Option<f64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateReportRequest {
    #[serde(default)]
    pub submission_id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReportRequest {
    #[serde(default)]
    pub status: String,
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub submission_id: String,
    pub student_id: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarityReport {
    pub submission_id: String,
    pub compared: usize,
    pub matches: Vec<SimilarityMatch>,
    pub report: Option<IntegrityReport>,
}

// ============================================================================
// PRIVACY
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConsentPurpose {
    Analytics,
    AiTutoring,
    Marketing,
    Research,
}

impl ConsentPurpose {
    pub const ALL: [ConsentPurpose; 4] = [
        ConsentPurpose::Analytics,
        ConsentPurpose::AiTutoring,
        ConsentPurpose::Marketing,
        ConsentPurpose::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentPurpose::Analytics => "analytics",
            ConsentPurpose::AiTutoring => "ai_tutoring",
            ConsentPurpose::Marketing => "marketing",
            ConsentPurpose::Research => "research",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analytics" => Some(ConsentPurpose::Analytics),
            "ai_tutoring" => Some(ConsentPurpose::AiTutoring),
            "marketing" => Some(ConsentPurpose::Marketing),
            "research" => Some(ConsentPurpose::Research),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: String,
    pub user_id: String,
    pub purpose: ConsentPurpose,
    pub granted: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsentState {
    pub purpose: ConsentPurpose,
    pub granted: bool,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetConsentRequest {
    #[serde(default)]
    pub purpose: String,
    pub granted: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeletionRequest {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyRequestKind {
    Export,
    Deletion,
}

impl PrivacyRequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyRequestKind::Export => "export",
            PrivacyRequestKind::Deletion => "deletion",
        }
    }
}

impl From<&str> for PrivacyRequestKind {
    fn from(s: &str) -> Self {
        match s {
            "deletion" => PrivacyRequestKind::Deletion,
            _ => PrivacyRequestKind::Export,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyRequest {
    pub id: String,
    pub user_id: String,
    pub kind: PrivacyRequestKind,
    pub status: String,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

// ============================================================================
// PORTFOLIO
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub submission_id: Option<String>,
    pub tags: Vec<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePortfolioItemRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub submission_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ============================================================================
// WEBSOCKET EVENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsEvent {
    #[serde(rename = "points_awarded")]
    PointsAwarded(PointsAwardedEvent),

    #[serde(rename = "achievement_unlocked")]
    AchievementUnlocked(AchievementUnlockedEvent),

    #[serde(rename = "checkpoint_completed")]
    CheckpointCompleted(CheckpointCompletedEvent),

    #[serde(rename = "integrity_report_opened")]
    IntegrityReportOpened(IntegrityReportEvent),

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "pong")]
    Pong,
}

impl WsEvent {
    /// User the event is addressed to; keepalives have none.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            WsEvent::PointsAwarded(e) => Some(&e.user_id),
            WsEvent::AchievementUnlocked(e) => Some(&e.user_id),
            WsEvent::CheckpointCompleted(e) => Some(&e.user_id),
            WsEvent::IntegrityReportOpened(e) => Some(&e.user_id),
            WsEvent::Ping | WsEvent::Pong => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsAwardedEvent {
    pub user_id: String,
    pub action: PointsAction,
    pub amount: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementUnlockedEvent {
    pub user_id: String,
    pub code: String,
    pub name: String,
    pub reward_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointCompletedEvent {
    pub user_id: String,
    pub pathway_id: String,
    pub checkpoint_id: String,
    pub percent: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReportEvent {
    /// Student whose submission is under review
    pub user_id: String,
    pub report_id: String,
    pub kind: ReportKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::parse("teacher"), Some(Role::Teacher));
        assert_eq!(Role::parse("root"), None);
        assert_eq!(Role::from("unknown"), Role::Student);
        assert!(Role::Admin.is_staff());
        assert!(!Role::Student.is_staff());
    }

    #[test]
    fn test_points_action_round_trip_strings() {
        for action in [
            PointsAction::AssignmentSubmitted,
            PointsAction::EarlySubmission,
            PointsAction::MilestoneCompleted,
            PointsAction::CheckpointCompleted,
            PointsAction::PathwayCompleted,
            PointsAction::TutorSessionCompleted,
            PointsAction::AchievementUnlocked,
            PointsAction::ManualAward,
            PointsAction::Redemption,
        ] {
            assert_eq!(PointsAction::from(action.as_str()), action);
        }
    }

    #[test]
    fn test_points_action_base_values() {
        assert_eq!(PointsAction::AssignmentSubmitted.base_points(), Some(50));
        assert_eq!(PointsAction::PathwayCompleted.base_points(), Some(100));
        assert_eq!(PointsAction::CheckpointCompleted.base_points(), None);
        assert!(PointsAction::MilestoneCompleted.is_user_driven());
        assert!(!PointsAction::ManualAward.is_user_driven());
        assert!(!PointsAction::AchievementUnlocked.is_user_driven());
    }

    #[test]
    fn test_staff_grants_do_not_use_daily_cap() {
        let capped = PointsAction::daily_cap_actions();
        assert_eq!(capped.len(), 6);
        assert!(capped.contains(&"checkpoint_completed"));
        assert!(capped.contains(&"assignment_submitted"));
        assert!(!capped.contains(&"manual_award"));
        assert!(!capped.contains(&"achievement_unlocked"));
        assert!(!capped.contains(&"redemption"));
    }

    #[test]
    fn test_report_status_transitions() {
        use ReportStatus::*;
        assert!(Open.can_transition_to(Investigating));
        assert!(Open.can_transition_to(Dismissed));
        assert!(!Open.can_transition_to(Resolved));
        assert!(Investigating.can_transition_to(Resolved));
        assert!(!Resolved.can_transition_to(Open));
        assert!(!Dismissed.can_transition_to(Investigating));
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(PathwayProgress::percent_of(0, 0), 0);
        assert_eq!(PathwayProgress::percent_of(1, 3), 33);
        assert_eq!(PathwayProgress::percent_of(3, 3), 100);
        assert_eq!(PathwayProgress::percent_of(5, 3), 100);
    }

    #[test]
    fn test_ws_event_serialization() {
        let event = WsEvent::PointsAwarded(PointsAwardedEvent {
            user_id: "user-1".to_string(),
            action: PointsAction::MilestoneCompleted,
            amount: 15,
            balance: 115,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("points_awarded"));
        assert!(json.contains("milestone_completed"));
        assert_eq!(event.recipient(), Some("user-1"));
        assert_eq!(WsEvent::Ping.recipient(), None);
    }

    #[test]
    fn test_user_achievement_flattens_definition() {
        let ua = UserAchievement {
            achievement: Achievement {
                code: "points_100".to_string(),
                name: "Century".to_string(),
                description: "Earn 100 points".to_string(),
                metric: AchievementMetric::LifetimePoints,
                threshold: 100,
                reward_points: 10,
            },
            unlocked_at: None,
            progress: 40,
        };

        let json = serde_json::to_value(&ua).unwrap();
        assert_eq!(json["code"], "points_100");
        assert_eq!(json["metric"], "lifetime_points");
        assert_eq!(json["progress"], 40);
    }

    #[test]
    fn test_register_request_defaults_missing_fields() {
        let req: RegisterRequest = serde_json::from_str(r#"{"email":"a@b.c"}"#).unwrap();
        assert_eq!(req.email, "a@b.c");
        assert!(req.password.is_empty());
        assert!(req.role.is_none());
    }
}
