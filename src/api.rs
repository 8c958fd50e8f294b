use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    auth::{self, AuthedUser},
    database::Database,
    errors::{classify_database_error, ApiError, ErrorContext},
    models::*,
    tutor_service::TutorService,
};

// Import logging macros
use crate::{log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub tutor: TutorService,
}

#[derive(Deserialize)]
pub struct LessonListParams {
    pub course: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct ProviderParams {
    pub provider: Option<String>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

// Auth endpoints

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<RegisteredUser> {
    log_api_start!("register");

    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        let error = ApiError::ValidationError("username and password are required".to_string());
        return Err(error.to_response_with_context(ErrorContext::new("register", "user")));
    }
    if request.password.len() < auth::MIN_PASSWORD_LENGTH {
        let error = ApiError::ValidationError(format!(
            "password must be at least {} characters",
            auth::MIN_PASSWORD_LENGTH
        ));
        return Err(error.to_response_with_context(ErrorContext::new("register", "user")));
    }

    match state.db.get_user_by_username(username).await {
        Ok(Some(_)) => {
            let error = ApiError::DuplicateResource(format!("username '{}' is taken", username));
            Err(error.to_response_with_context(
                ErrorContext::new("register", "user").with_id(username),
            ))
        }
        Ok(None) => {
            let password_hash = auth::hash_password(&request.password);
            match state.db.create_user(username, &password_hash).await {
                Ok(user) => {
                    info!(user_id = %user.id, username = %user.username, "User registered");
                    Ok(Json(ApiResponse::success(RegisteredUser {
                        id: user.id,
                        username: user.username,
                    })))
                }
                Err(e) => {
                    let classified = classify_database_error(&e);
                    Err(classified.to_response_with_context(
                        ErrorContext::new("register", "user").with_id(username),
                    ))
                }
            }
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(ErrorContext::new("register", "user")))
        }
    }
}

pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> ApiResult<TokenResponse> {
    log_api_start!("issue_token");

    let user = match state.db.get_user_by_username(request.username.trim()).await {
        Ok(user) => user,
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            return Err(error.to_response_with_context(ErrorContext::new("issue_token", "user")));
        }
    };

    let valid = user
        .as_ref()
        .map(|u| auth::verify_password(&request.password, &u.password_hash))
        .unwrap_or(false);

    let Some(user) = user.filter(|_| valid) else {
        let error = ApiError::Unauthorized("invalid username or password".to_string());
        return Err(error.to_response_with_context(ErrorContext::new("issue_token", "user")));
    };

    let token = auth::generate_token();
    match state.db.insert_auth_token(&token, user.id).await {
        Ok(()) => {
            info!(user_id = %user.id, "Token issued");
            Ok(Json(ApiResponse::success(TokenResponse { token })))
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(ErrorContext::new("issue_token", "token")))
        }
    }
}

// Course endpoints

pub async fn create_course(
    State(state): State<AppState>,
    _user: AuthedUser,
    Json(request): Json<CreateCourseRequest>,
) -> ApiResult<Course> {
    info!(title = %request.title, "Creating new course");

    if request.title.trim().is_empty() {
        let error = ApiError::ValidationError("title is required".to_string());
        return Err(error.to_response_with_context(ErrorContext::new("create_course", "course")));
    }

    match state.db.create_course(request).await {
        Ok(course) => {
            info!(course_id = %course.id, "Course created successfully");
            Ok(Json(ApiResponse::success(course)))
        }
        Err(e) => {
            let classified = classify_database_error(&e);
            Err(classified.to_response_with_context(ErrorContext::new("create_course", "course")))
        }
    }
}

pub async fn get_all_courses(State(state): State<AppState>) -> ApiResult<Vec<Course>> {
    debug!("Getting all courses");

    match state.db.get_all_courses().await {
        Ok(courses) => {
            log_api_success!("get_all_courses", count = courses.len(), "courses retrieved");
            Ok(Json(ApiResponse::success(courses)))
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(ErrorContext::new("get_all_courses", "course")))
        }
    }
}

pub async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Course> {
    log_api_start!("get_course", course_id = id);

    match state.db.get_course(id).await {
        Ok(Some(course)) => Ok(Json(ApiResponse::success(course))),
        Ok(None) => {
            let error = ApiError::NotFound(format!("Course with ID '{}' not found", id));
            Err(error.to_response_with_context(
                ErrorContext::new("get_course", "course").with_id(&id.to_string()),
            ))
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(
                ErrorContext::new("get_course", "course").with_id(&id.to_string()),
            ))
        }
    }
}

pub async fn update_course(
    State(state): State<AppState>,
    _user: AuthedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCourseRequest>,
) -> ApiResult<Course> {
    info!(course_id = %id, "Updating course");

    match state.db.update_course(id, request).await {
        Ok(Some(course)) => Ok(Json(ApiResponse::success(course))),
        Ok(None) => {
            let error = ApiError::NotFound(format!("Course with ID '{}' not found", id));
            Err(error.to_response_with_context(
                ErrorContext::new("update_course", "course").with_id(&id.to_string()),
            ))
        }
        Err(e) => {
            let classified = classify_database_error(&e);
            Err(classified.to_response_with_context(
                ErrorContext::new("update_course", "course").with_id(&id.to_string()),
            ))
        }
    }
}

pub async fn delete_course(
    State(state): State<AppState>,
    _user: AuthedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<bool> {
    info!(course_id = %id, "Deleting course");

    match state.db.delete_course(id).await {
        Ok(true) => Ok(Json(ApiResponse::success(true))),
        Ok(false) => {
            let error = ApiError::NotFound(format!("Course with ID '{}' not found", id));
            Err(error.to_response_with_context(
                ErrorContext::new("delete_course", "course").with_id(&id.to_string()),
            ))
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(
                ErrorContext::new("delete_course", "course").with_id(&id.to_string()),
            ))
        }
    }
}

// Lesson endpoints

pub async fn create_lesson(
    State(state): State<AppState>,
    _user: AuthedUser,
    Json(request): Json<CreateLessonRequest>,
) -> ApiResult<Lesson> {
    info!(course_id = %request.course_id, title = %request.title, "Creating new lesson");

    if request.title.trim().is_empty() || request.content.trim().is_empty() {
        let error = ApiError::ValidationError("title and content are required".to_string());
        return Err(error.to_response_with_context(ErrorContext::new("create_lesson", "lesson")));
    }

    match state.db.get_course(request.course_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let error = ApiError::ValidationError(format!(
                "course '{}' does not exist",
                request.course_id
            ));
            return Err(error.to_response_with_context(
                ErrorContext::new("create_lesson", "lesson"),
            ));
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            return Err(error.to_response_with_context(
                ErrorContext::new("create_lesson", "lesson"),
            ));
        }
    }

    match state.db.create_lesson(request).await {
        Ok(lesson) => {
            log_api_success!("create_lesson", lesson_id = lesson.id, "lesson created");
            Ok(Json(ApiResponse::success(lesson)))
        }
        Err(e) => {
            let classified = classify_database_error(&e);
            Err(classified.to_response_with_context(ErrorContext::new("create_lesson", "lesson")))
        }
    }
}

pub async fn get_lessons(
    State(state): State<AppState>,
    Query(params): Query<LessonListParams>,
) -> ApiResult<Vec<Lesson>> {
    debug!(course_id = ?params.course, "Getting lessons");

    match state.db.get_lessons(params.course).await {
        Ok(lessons) => {
            log_api_success!("get_lessons", count = lessons.len(), "lessons retrieved");
            Ok(Json(ApiResponse::success(lessons)))
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(ErrorContext::new("get_lessons", "lesson")))
        }
    }
}

pub async fn get_lesson(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Lesson> {
    log_api_start!("get_lesson", lesson_id = id);

    match state.db.get_lesson(id).await {
        Ok(Some(lesson)) => Ok(Json(ApiResponse::success(lesson))),
        Ok(None) => {
            let error = ApiError::NotFound(format!("Lesson with ID '{}' not found", id));
            Err(error.to_response_with_context(
                ErrorContext::new("get_lesson", "lesson").with_id(&id.to_string()),
            ))
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(
                ErrorContext::new("get_lesson", "lesson").with_id(&id.to_string()),
            ))
        }
    }
}

pub async fn update_lesson(
    State(state): State<AppState>,
    _user: AuthedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateLessonRequest>,
) -> ApiResult<Lesson> {
    info!(lesson_id = %id, "Updating lesson");

    match state.db.update_lesson(id, request).await {
        Ok(Some(lesson)) => Ok(Json(ApiResponse::success(lesson))),
        Ok(None) => {
            let error = ApiError::NotFound(format!("Lesson with ID '{}' not found", id));
            Err(error.to_response_with_context(
                ErrorContext::new("update_lesson", "lesson").with_id(&id.to_string()),
            ))
        }
        Err(e) => {
            let classified = classify_database_error(&e);
            Err(classified.to_response_with_context(
                ErrorContext::new("update_lesson", "lesson").with_id(&id.to_string()),
            ))
        }
    }
}

pub async fn delete_lesson(
    State(state): State<AppState>,
    _user: AuthedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<bool> {
    info!(lesson_id = %id, "Deleting lesson");

    match state.db.delete_lesson(id).await {
        Ok(true) => Ok(Json(ApiResponse::success(true))),
        Ok(false) => {
            let error = ApiError::NotFound(format!("Lesson with ID '{}' not found", id));
            Err(error.to_response_with_context(
                ErrorContext::new("delete_lesson", "lesson").with_id(&id.to_string()),
            ))
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(
                ErrorContext::new("delete_lesson", "lesson").with_id(&id.to_string()),
            ))
        }
    }
}

// Progress endpoints

pub async fn complete_lesson(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<UserProgress> {
    log_api_start!("complete_lesson", lesson_id = id);

    match state.db.get_lesson(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let error = ApiError::NotFound(format!("Lesson with ID '{}' not found", id));
            return Err(error.to_response_with_context(
                ErrorContext::new("complete_lesson", "lesson").with_id(&id.to_string()),
            ));
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            return Err(error.to_response_with_context(
                ErrorContext::new("complete_lesson", "lesson").with_id(&id.to_string()),
            ));
        }
    }

    match state.db.complete_lesson(user.id, id).await {
        Ok(progress) => {
            log_api_success!("complete_lesson", lesson_id = id, "progress recorded");
            Ok(Json(ApiResponse::success(progress)))
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(
                ErrorContext::new("complete_lesson", "progress").with_id(&id.to_string()),
            ))
        }
    }
}

// AI tutor endpoints

pub async fn ask_lesson(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<Uuid>,
    Query(params): Query<ProviderParams>,
    Json(request): Json<AskRequest>,
) -> ApiResult<AskResponse> {
    log_api_start!("ask_lesson", lesson_id = id);

    let question = request.question.trim();
    if question.is_empty() {
        log_api_warn!("ask_lesson", lesson_id = id, "empty question rejected");
        let error = ApiError::ValidationError("question is required".to_string());
        return Err(error.to_response_with_context(
            ErrorContext::new("ask_lesson", "lesson").with_id(&id.to_string()),
        ));
    }

    let lesson = match state.db.get_lesson(id).await {
        Ok(Some(lesson)) => lesson,
        Ok(None) => {
            let error = ApiError::NotFound(format!("Lesson with ID '{}' not found", id));
            return Err(error.to_response_with_context(
                ErrorContext::new("ask_lesson", "lesson").with_id(&id.to_string()),
            ));
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            return Err(error.to_response_with_context(
                ErrorContext::new("ask_lesson", "lesson").with_id(&id.to_string()),
            ));
        }
    };

    // Body override takes priority over the query parameter
    let override_name = request.provider.as_deref().or(params.provider.as_deref());

    let answer = state
        .tutor
        .ask_lesson(&lesson.content, question, override_name)
        .await;

    info!(
        lesson_id = %id,
        user_id = %user.id,
        provider = %answer.provider,
        "Lesson question answered"
    );

    Ok(Json(ApiResponse::success(AskResponse {
        answer: answer.text,
        provider: answer.provider,
    })))
}

pub async fn generate_task(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<Uuid>,
    Query(params): Query<ProviderParams>,
) -> ApiResult<GeneratedTask> {
    log_api_start!("generate_task", lesson_id = id);

    let lesson = match state.db.get_lesson(id).await {
        Ok(Some(lesson)) => lesson,
        Ok(None) => {
            let error = ApiError::NotFound(format!("Lesson with ID '{}' not found", id));
            return Err(error.to_response_with_context(
                ErrorContext::new("generate_task", "lesson").with_id(&id.to_string()),
            ));
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            return Err(error.to_response_with_context(
                ErrorContext::new("generate_task", "lesson").with_id(&id.to_string()),
            ));
        }
    };

    let draft = state
        .tutor
        .generate_task(&lesson.title, &lesson.content, params.provider.as_deref())
        .await;

    // Persist even a degraded draft; generation is never "failed"
    match state
        .db
        .create_task(lesson.id, user.id, &draft.task_text, &draft.solution_text)
        .await
    {
        Ok(task) => {
            log_api_success!("generate_task", task_id = task.id, "task generated and stored");
            Ok(Json(ApiResponse::success(task)))
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(
                ErrorContext::new("generate_task", "task").with_id(&id.to_string()),
            ))
        }
    }
}

pub async fn check_task(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CheckTaskRequest>,
) -> ApiResult<CheckTaskResponse> {
    log_api_start!("check_task", task_id = id);

    let student_answer = request.answer.trim();
    if student_answer.is_empty() {
        let error = ApiError::ValidationError("answer is required".to_string());
        return Err(error.to_response_with_context(
            ErrorContext::new("check_task", "task").with_id(&id.to_string()),
        ));
    }

    // Scoped to the requesting user; other users' tasks look like 404s
    let task = match state.db.get_task_for_user(id, user.id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            let error = ApiError::NotFound(format!("Task with ID '{}' not found", id));
            return Err(error.to_response_with_context(
                ErrorContext::new("check_task", "task").with_id(&id.to_string()),
            ));
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            return Err(error.to_response_with_context(
                ErrorContext::new("check_task", "task").with_id(&id.to_string()),
            ));
        }
    };

    let is_correct = state
        .tutor
        .verify_answer(&task.solution_text, student_answer)
        .await;

    match state
        .db
        .record_task_verdict(task.id, student_answer, is_correct)
        .await
    {
        Ok(()) => {
            log_api_success!("check_task", task_id = task.id, "verdict recorded");
            Ok(Json(ApiResponse::success(CheckTaskResponse {
                id: task.id,
                is_correct,
            })))
        }
        Err(e) => {
            let error = ApiError::DatabaseError(e);
            Err(error.to_response_with_context(
                ErrorContext::new("check_task", "task").with_id(&id.to_string()),
            ))
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Auth routes
        .route("/api/auth/register", post(register))
        .route("/api/auth/token", post(issue_token))
        // Course routes
        .route("/api/courses", post(create_course))
        .route("/api/courses", get(get_all_courses))
        .route("/api/courses/:id", get(get_course))
        .route("/api/courses/:id", put(update_course))
        .route("/api/courses/:id", delete(delete_course))
        // Lesson routes
        .route("/api/lessons", post(create_lesson))
        .route("/api/lessons", get(get_lessons))
        .route("/api/lessons/:id", get(get_lesson))
        .route("/api/lessons/:id", put(update_lesson))
        .route("/api/lessons/:id", delete(delete_lesson))
        .route("/api/lessons/:id/complete", post(complete_lesson))
        // AI tutor routes
        .route("/api/lessons/:id/ask", post(ask_lesson))
        .route("/api/lessons/:id/task", get(generate_task))
        .route("/api/tasks/:id/check", post(check_task))
        .with_state(state)
}
