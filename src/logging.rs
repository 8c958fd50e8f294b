// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros for consistent field names and message patterns
/// across the application.

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, lesson_id = $lesson_id:expr) => {
        tracing::debug!(
            operation = $operation,
            lesson_id = %$lesson_id,
            "API operation started"
        );
    };
    ($operation:expr, task_id = $task_id:expr) => {
        tracing::debug!(
            operation = $operation,
            task_id = %$task_id,
            "API operation started"
        );
    };
    ($operation:expr, course_id = $course_id:expr) => {
        tracing::debug!(
            operation = $operation,
            course_id = %$course_id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(
            operation = $operation,
            "API operation started"
        );
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, lesson_id = $lesson_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            lesson_id = %$lesson_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, task_id = $task_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            task_id = %$task_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            "API operation completed: {}", $msg
        );
    };
}

/// Log API operation errors with consistent structure
#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, lesson_id = $lesson_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            lesson_id = %$lesson_id,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, task_id = $task_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            task_id = %$task_id,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, lesson_id = $lesson_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            lesson_id = %$lesson_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, task_id = $task_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            task_id = %$task_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            "API operation warning: {}", $msg
        );
    };
}

// ============================================================================
// AI Provider Logging Macros
// ============================================================================

/// Log provider chain resolution with provider context
#[macro_export]
macro_rules! log_ai_operation {
    (start, $operation:expr, provider = $provider:expr) => {
        tracing::info!(
            component = "tutor_service",
            operation = $operation,
            provider = %$provider,
            "AI operation started"
        );
    };
    (success, $operation:expr, provider = $provider:expr, response_length = $len:expr) => {
        tracing::info!(
            component = "tutor_service",
            operation = $operation,
            provider = %$provider,
            response_length = $len,
            "AI operation completed successfully"
        );
    };
    (skip, $operation:expr, provider = $provider:expr, $msg:expr) => {
        tracing::debug!(
            component = "tutor_service",
            operation = $operation,
            provider = %$provider,
            "Provider skipped: {}", $msg
        );
    };
    (exhausted, $operation:expr, chain_length = $len:expr) => {
        tracing::warn!(
            component = "tutor_service",
            operation = $operation,
            chain_length = $len,
            "All providers exhausted without an answer"
        );
    };
    (warn, $operation:expr, $msg:expr) => {
        tracing::warn!(
            component = "tutor_service",
            operation = $operation,
            "AI operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Database Operation Logging Macros
// ============================================================================

/// Log database operation results
#[macro_export]
macro_rules! log_db_operation {
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "database",
            operation = $operation,
            "Database operation: {}", $msg
        );
    };
    (error, $operation:expr, error = $error:expr) => {
        tracing::error!(
            component = "database",
            operation = $operation,
            error = %$error,
            "Database operation failed"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and configuration events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    #[test]
    fn test_logging_macros_compile() {
        let lesson_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();
        let error = anyhow::anyhow!("test error");

        log_api_start!("ask_lesson", lesson_id = lesson_id);
        log_api_start!("check_task", task_id = task_id);
        log_api_start!("list_courses");

        log_api_success!("ask_lesson", lesson_id = lesson_id, "answer resolved");
        log_api_success!("list_courses", count = 3, "courses listed");

        log_api_warn!("ask_lesson", lesson_id = lesson_id, "empty chain");
        log_api_error!("check_task", task_id = task_id, error = error, "verdict not stored");

        log_ai_operation!(start, "resolve", provider = "google");
        log_ai_operation!(success, "resolve", provider = "google", response_length = 42);
        log_ai_operation!(skip, "resolve", provider = "gigachat", "no answer");
        log_ai_operation!(exhausted, "resolve", chain_length = 2);

        log_db_operation!(info, "migration", "database initialized");

        log_system_event!(startup, component = "server", "server starting");
        log_system_event!(config, "configuration loaded successfully");

        log_validation!(success, "api_request", "request validated");
    }
}
