//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::badges::Badge;
use crate::domain::{ProgressDelta, ProgressRecord};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetProgress {
        #[serde(rename = "userId")]
        user_id: String,
    },
    AwardPoints {
        #[serde(rename = "userId")]
        user_id: String,
        points: u64,
        reason: String,
    },
    CompleteLesson {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "courseId")]
        course_id: String,
        #[serde(rename = "lessonId")]
        lesson_id: String,
    },
    CompleteCourse {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "courseId")]
        course_id: String,
    },
    CompleteQuiz {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "quizId")]
        quiz_id: String,
        score: u32,
        passed: bool,
    },
    CompleteExercise {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "exerciseId")]
        exercise_id: String,
        score: u32,
    },
    CheckIn {
        #[serde(rename = "userId")]
        user_id: String,
    },
    GetBadges,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Progress {
        progress: ProgressOut,
    },
    Awarded {
        delta: DeltaOut,
    },
    Completion {
        delta: DeltaOut,
    },
    Streak {
        delta: DeltaOut,
    },
    Badges {
        badges: Vec<Badge>,
    },
    Error {
        message: String,
    },
}

/// DTO used by both WS and HTTP for the progress panel.
#[derive(Debug, Serialize)]
pub struct ProgressOut {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "totalPoints")]
    pub total_points: u64,
    #[serde(rename = "experiencePoints")]
    pub experience_points: u64,
    #[serde(rename = "currentLevel")]
    pub current_level: u32,
    pub streak: u32,
    #[serde(rename = "longestStreak")]
    pub longest_streak: u32,
    #[serde(rename = "lastActiveDate")]
    pub last_active_date: Option<String>,
    pub badges: Vec<String>,
    #[serde(rename = "coursesCompleted")]
    pub courses_completed: u32,
    #[serde(rename = "lessonsCompleted")]
    pub lessons_completed: u32,
    #[serde(rename = "quizzesPassed")]
    pub quizzes_passed: u32,
    #[serde(rename = "codeExercisesCompleted")]
    pub code_exercises_completed: u32,
    #[serde(rename = "certificatesEarned")]
    pub certificates_earned: u32,
    pub disabled: bool,
}

/// Convert the internal record to the public DTO.
pub fn to_progress_out(r: &ProgressRecord) -> ProgressOut {
    ProgressOut {
        user_id: r.user_id.clone(),
        total_points: r.total_points,
        experience_points: r.experience_points,
        current_level: r.current_level,
        streak: r.streak,
        longest_streak: r.longest_streak,
        last_active_date: r.last_active_date.map(|d| d.to_string()),
        badges: r.badges.iter().cloned().collect(),
        courses_completed: r.courses_completed,
        lessons_completed: r.lessons_completed,
        quizzes_passed: r.quizzes_passed,
        code_exercises_completed: r.code_exercises_completed,
        certificates_earned: r.certificates_earned,
        disabled: r.disabled,
    }
}

/// Delta DTO consumed by the transient on-screen notification.
#[derive(Debug, Serialize)]
pub struct DeltaOut {
    #[serde(rename = "pointsAwarded")]
    pub points_awarded: u64,
    #[serde(rename = "leveledUp")]
    pub leveled_up: bool,
    #[serde(rename = "newLevel")]
    pub new_level: u32,
    pub streak: u32,
    #[serde(rename = "newBadges")]
    pub new_badges: Vec<String>,
    #[serde(rename = "alreadyRecorded")]
    pub already_recorded: bool,
}

pub fn to_delta_out(d: &ProgressDelta) -> DeltaOut {
    DeltaOut {
        points_awarded: d.points_awarded,
        leveled_up: d.leveled_up,
        new_level: d.new_level,
        streak: d.streak,
        new_badges: d.new_badges.clone(),
        already_recorded: d.already_recorded,
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Deserialize)]
pub struct AwardPointsIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub points: u64,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct LessonIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "courseId")]
    pub course_id: String,
    #[serde(rename = "lessonId")]
    pub lesson_id: String,
}

#[derive(Deserialize)]
pub struct CourseIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "courseId")]
    pub course_id: String,
}

#[derive(Deserialize)]
pub struct QuizIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "quizId")]
    pub quiz_id: String,
    pub score: u32,
    pub passed: bool,
}

#[derive(Deserialize)]
pub struct ExerciseIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "exerciseId")]
    pub exercise_id: String,
    pub score: u32,
}

#[derive(Deserialize)]
pub struct CheckInIn {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Deserialize)]
pub struct DisableIn {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub disabled: bool,
}

#[derive(Serialize)]
pub struct OkOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
