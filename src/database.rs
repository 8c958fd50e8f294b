use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database is private to its connection, so the pool
        // must not open more than one
        let mut pool_options = SqlitePoolOptions::new();
        if database_url.contains(":memory:") {
            pool_options = pool_options.max_connections(1);
        }

        let pool = pool_options.connect_with(options).await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auth_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT ''
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lessons (
                id TEXT PRIMARY KEY,
                course_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_progress (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                lesson_id TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                UNIQUE (user_id, lesson_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generated_tasks (
                id TEXT PRIMARY KEY,
                lesson_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                task_text TEXT NOT NULL,
                solution_text TEXT NOT NULL DEFAULT '',
                student_answer TEXT,
                is_correct INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // User operations

    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_user).transpose()
    }

    pub async fn insert_auth_token(&self, token: &str, user_id: Uuid) -> Result<()> {
        sqlx::query("INSERT INTO auth_tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(token)
            .bind(user_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT users.* FROM users
            JOIN auth_tokens ON auth_tokens.user_id = users.id
            WHERE auth_tokens.token = ?1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_user).transpose()
    }

    // Course operations

    pub async fn create_course(&self, request: CreateCourseRequest) -> Result<Course> {
        let course = Course {
            id: Uuid::new_v4(),
            title: request.title,
            description: request.description,
        };

        sqlx::query("INSERT INTO courses (id, title, description) VALUES (?1, ?2, ?3)")
            .bind(course.id.to_string())
            .bind(&course.title)
            .bind(&course.description)
            .execute(&self.pool)
            .await?;

        Ok(course)
    }

    pub async fn get_course(&self, id: Uuid) -> Result<Option<Course>> {
        let row = sqlx::query("SELECT * FROM courses WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_course).transpose()
    }

    pub async fn get_all_courses(&self) -> Result<Vec<Course>> {
        let rows = sqlx::query("SELECT * FROM courses ORDER BY title")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_course).collect()
    }

    pub async fn update_course(
        &self,
        id: Uuid,
        request: UpdateCourseRequest,
    ) -> Result<Option<Course>> {
        let Some(mut course) = self.get_course(id).await? else {
            return Ok(None);
        };

        if let Some(title) = request.title {
            course.title = title;
        }
        if let Some(description) = request.description {
            course.description = description;
        }

        sqlx::query("UPDATE courses SET title = ?1, description = ?2 WHERE id = ?3")
            .bind(&course.title)
            .bind(&course.description)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(Some(course))
    }

    pub async fn delete_course(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Lesson operations

    pub async fn create_lesson(&self, request: CreateLessonRequest) -> Result<Lesson> {
        let lesson = Lesson {
            id: Uuid::new_v4(),
            course_id: request.course_id,
            title: request.title,
            content: request.content,
        };

        sqlx::query("INSERT INTO lessons (id, course_id, title, content) VALUES (?1, ?2, ?3, ?4)")
            .bind(lesson.id.to_string())
            .bind(lesson.course_id.to_string())
            .bind(&lesson.title)
            .bind(&lesson.content)
            .execute(&self.pool)
            .await?;

        Ok(lesson)
    }

    pub async fn get_lesson(&self, id: Uuid) -> Result<Option<Lesson>> {
        let row = sqlx::query("SELECT * FROM lessons WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_lesson).transpose()
    }

    pub async fn get_lessons(&self, course_id: Option<Uuid>) -> Result<Vec<Lesson>> {
        let rows = match course_id {
            Some(course_id) => {
                sqlx::query("SELECT * FROM lessons WHERE course_id = ?1 ORDER BY title")
                    .bind(course_id.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM lessons ORDER BY title")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(row_to_lesson).collect()
    }

    pub async fn update_lesson(
        &self,
        id: Uuid,
        request: UpdateLessonRequest,
    ) -> Result<Option<Lesson>> {
        let Some(mut lesson) = self.get_lesson(id).await? else {
            return Ok(None);
        };

        if let Some(title) = request.title {
            lesson.title = title;
        }
        if let Some(content) = request.content {
            lesson.content = content;
        }

        sqlx::query("UPDATE lessons SET title = ?1, content = ?2 WHERE id = ?3")
            .bind(&lesson.title)
            .bind(&lesson.content)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(Some(lesson))
    }

    pub async fn delete_lesson(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM lessons WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Progress operations

    /// Record lesson completion. Re-completing a lesson is a no-op that
    /// returns the original progress row.
    pub async fn complete_lesson(&self, user_id: Uuid, lesson_id: Uuid) -> Result<UserProgress> {
        sqlx::query(
            r#"
            INSERT INTO user_progress (id, user_id, lesson_id, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (user_id, lesson_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(lesson_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT * FROM user_progress WHERE user_id = ?1 AND lesson_id = ?2",
        )
        .bind(user_id.to_string())
        .bind(lesson_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        row_to_progress(row)
    }

    // Generated task operations

    pub async fn create_task(
        &self,
        lesson_id: Uuid,
        user_id: Uuid,
        task_text: &str,
        solution_text: &str,
    ) -> Result<GeneratedTask> {
        let task = GeneratedTask {
            id: Uuid::new_v4(),
            lesson_id,
            user_id,
            task_text: task_text.to_string(),
            solution_text: solution_text.to_string(),
            student_answer: None,
            is_correct: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO generated_tasks (id, lesson_id, user_id, task_text, solution_text, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.lesson_id.to_string())
        .bind(task.user_id.to_string())
        .bind(&task.task_text)
        .bind(&task.solution_text)
        .bind(task.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(task)
    }

    /// Fetch a task only if it belongs to the given user. Cross-user lookups
    /// behave as if the task does not exist.
    pub async fn get_task_for_user(
        &self,
        task_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GeneratedTask>> {
        let row = sqlx::query("SELECT * FROM generated_tasks WHERE id = ?1 AND user_id = ?2")
            .bind(task_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_task).transpose()
    }

    /// Store the student answer and verdict together. Repeated checks
    /// overwrite both fields (last write wins).
    pub async fn record_task_verdict(
        &self,
        task_id: Uuid,
        student_answer: &str,
        is_correct: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE generated_tasks SET student_answer = ?1, is_correct = ?2 WHERE id = ?3",
        )
        .bind(student_answer)
        .bind(is_correct)
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_user(row: sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))?
            .with_timezone(&Utc),
    })
}

fn row_to_course(row: sqlx::sqlite::SqliteRow) -> Result<Course> {
    Ok(Course {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        title: row.get("title"),
        description: row.get("description"),
    })
}

fn row_to_lesson(row: sqlx::sqlite::SqliteRow) -> Result<Lesson> {
    Ok(Lesson {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        course_id: Uuid::parse_str(&row.get::<String, _>("course_id"))?,
        title: row.get("title"),
        content: row.get("content"),
    })
}

fn row_to_progress(row: sqlx::sqlite::SqliteRow) -> Result<UserProgress> {
    Ok(UserProgress {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        user_id: Uuid::parse_str(&row.get::<String, _>("user_id"))?,
        lesson_id: Uuid::parse_str(&row.get::<String, _>("lesson_id"))?,
        completed_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("completed_at"))?
            .with_timezone(&Utc),
    })
}

fn row_to_task(row: sqlx::sqlite::SqliteRow) -> Result<GeneratedTask> {
    Ok(GeneratedTask {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        lesson_id: Uuid::parse_str(&row.get::<String, _>("lesson_id"))?,
        user_id: Uuid::parse_str(&row.get::<String, _>("user_id"))?,
        task_text: row.get("task_text"),
        solution_text: row.get("solution_text"),
        student_answer: row.get("student_answer"),
        is_correct: row.get("is_correct"),
        created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))?
            .with_timezone(&Utc),
    })
}
