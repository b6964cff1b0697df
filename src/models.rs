use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = organizations)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub require_feedback_before_closure: bool,
    pub require_manager_approval: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = organizations)]
pub struct NewOrganization {
    pub id: Uuid,
    pub name: String,
    pub require_feedback_before_closure: bool,
    pub require_manager_approval: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = users)]
#[diesel(belongs_to(Organization))]
pub struct User {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub is_super_admin: bool,
    pub is_active: bool,
    pub service_permissions: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub is_super_admin: bool,
    pub service_permissions: Vec<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = customers)]
pub struct Customer {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tier: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = customers)]
pub struct NewCustomer {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = products)]
pub struct Product {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub unit: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = products)]
pub struct NewProduct {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub unit: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ticket_number: String,
    pub customer_id: Uuid,
    pub assigned_to_id: Option<Uuid>,
    pub created_by_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub ticket_type: String,
    pub resolution: Option<String>,
    pub resolved_at: Option<NaiveDateTime>,
    pub closed_at: Option<NaiveDateTime>,
    pub due_date: Option<NaiveDateTime>,
    pub customer_rating: Option<i32>,
    pub customer_feedback: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicket {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ticket_number: String,
    pub customer_id: Uuid,
    pub assigned_to_id: Option<Uuid>,
    pub created_by_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub ticket_type: String,
    pub due_date: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = ticket_history)]
#[diesel(belongs_to(Ticket))]
pub struct TicketHistory {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ticket_id: Uuid,
    pub action: String,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub changed_by_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_history)]
pub struct NewTicketHistory {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ticket_id: Uuid,
    pub action: String,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub changed_by_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = sla_policies)]
pub struct SlaPolicy {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub ticket_type: Option<String>,
    pub customer_tier: Option<String>,
    pub response_time_hours: f64,
    pub resolution_time_hours: f64,
    pub escalation_enabled: bool,
    pub escalation_threshold_percent: f64,
    pub is_active: bool,
    pub is_default: bool,
    pub created_by_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sla_policies)]
pub struct NewSlaPolicy {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub ticket_type: Option<String>,
    pub customer_tier: Option<String>,
    pub response_time_hours: f64,
    pub resolution_time_hours: f64,
    pub escalation_enabled: bool,
    pub escalation_threshold_percent: f64,
    pub is_active: bool,
    pub is_default: bool,
    pub created_by_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = sla_tracking)]
#[diesel(belongs_to(Ticket))]
#[diesel(belongs_to(SlaPolicy, foreign_key = policy_id))]
pub struct SlaTracking {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ticket_id: Uuid,
    pub policy_id: Uuid,
    pub started_at: NaiveDateTime,
    pub response_deadline: NaiveDateTime,
    pub resolution_deadline: NaiveDateTime,
    pub first_response_at: Option<NaiveDateTime>,
    pub resolved_at: Option<NaiveDateTime>,
    pub response_status: String,
    pub resolution_status: String,
    pub response_breach_hours: Option<f64>,
    pub resolution_breach_hours: Option<f64>,
    pub escalation_triggered: bool,
    pub escalation_triggered_at: Option<NaiveDateTime>,
    pub escalation_level: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sla_tracking)]
pub struct NewSlaTracking {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ticket_id: Uuid,
    pub policy_id: Uuid,
    pub started_at: NaiveDateTime,
    pub response_deadline: NaiveDateTime,
    pub resolution_deadline: NaiveDateTime,
    pub response_status: String,
    pub resolution_status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = dispatch_orders)]
pub struct DispatchOrder {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub status: String,
    pub dispatch_date: Option<NaiveDateTime>,
    pub expected_delivery_date: Option<NaiveDateTime>,
    pub actual_delivery_date: Option<NaiveDateTime>,
    pub delivery_address: String,
    pub delivery_contact_person: Option<String>,
    pub delivery_contact_number: Option<String>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub courier_name: Option<String>,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = dispatch_orders)]
pub struct NewDispatchOrder {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub status: String,
    pub expected_delivery_date: Option<NaiveDateTime>,
    pub delivery_address: String,
    pub delivery_contact_person: Option<String>,
    pub delivery_contact_number: Option<String>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub courier_name: Option<String>,
    pub created_by_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = dispatch_items)]
#[diesel(belongs_to(DispatchOrder))]
pub struct DispatchItem {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub dispatch_order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: f64,
    pub unit: String,
    pub description: Option<String>,
    pub serial_numbers: Option<String>,
    pub batch_numbers: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = dispatch_items)]
pub struct NewDispatchItem {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub dispatch_order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: f64,
    pub unit: String,
    pub description: Option<String>,
    pub serial_numbers: Option<String>,
    pub batch_numbers: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = installation_jobs)]
#[diesel(belongs_to(DispatchOrder))]
pub struct InstallationJob {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub job_number: String,
    pub dispatch_order_id: Uuid,
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub status: String,
    pub priority: String,
    pub scheduled_date: Option<NaiveDateTime>,
    pub estimated_duration_hours: Option<f64>,
    pub actual_start_time: Option<NaiveDateTime>,
    pub actual_end_time: Option<NaiveDateTime>,
    pub installation_address: String,
    pub contact_person: Option<String>,
    pub contact_number: Option<String>,
    pub installation_notes: Option<String>,
    pub completion_notes: Option<String>,
    pub assigned_technician_id: Option<Uuid>,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = installation_jobs)]
pub struct NewInstallationJob {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub job_number: String,
    pub dispatch_order_id: Uuid,
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub status: String,
    pub priority: String,
    pub scheduled_date: Option<NaiveDateTime>,
    pub estimated_duration_hours: Option<f64>,
    pub installation_address: String,
    pub contact_person: Option<String>,
    pub contact_number: Option<String>,
    pub installation_notes: Option<String>,
    pub assigned_technician_id: Option<Uuid>,
    pub created_by_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = installation_tasks)]
#[diesel(belongs_to(InstallationJob))]
pub struct InstallationTask {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub installation_job_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub sequence_order: i32,
    pub depends_on_task_id: Option<Uuid>,
    pub status: String,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = installation_tasks)]
pub struct NewInstallationTask {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub installation_job_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub sequence_order: i32,
    pub depends_on_task_id: Option<Uuid>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = completion_records)]
#[diesel(belongs_to(InstallationJob))]
pub struct CompletionRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub installation_job_id: Uuid,
    pub completed_by_id: Uuid,
    pub completed_at: NaiveDateTime,
    pub actual_duration_hours: Option<f64>,
    pub work_performed: String,
    pub issues_encountered: Option<String>,
    pub quality_check_passed: bool,
    pub customer_present: bool,
    pub customer_signature_received: bool,
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDateTime>,
    pub follow_up_notes: Option<String>,
    pub feedback_request_sent: bool,
    pub feedback_request_sent_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = completion_records)]
pub struct NewCompletionRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub installation_job_id: Uuid,
    pub completed_by_id: Uuid,
    pub completed_at: NaiveDateTime,
    pub actual_duration_hours: Option<f64>,
    pub work_performed: String,
    pub issues_encountered: Option<String>,
    pub quality_check_passed: bool,
    pub customer_present: bool,
    pub customer_signature_received: bool,
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDateTime>,
    pub follow_up_notes: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = customer_feedback)]
#[diesel(belongs_to(InstallationJob))]
pub struct CustomerFeedback {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub installation_job_id: Uuid,
    pub completion_record_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub overall_rating: i32,
    pub service_quality_rating: Option<i32>,
    pub technician_rating: Option<i32>,
    pub timeliness_rating: Option<i32>,
    pub communication_rating: Option<i32>,
    pub comments: Option<String>,
    pub would_recommend: Option<bool>,
    pub satisfaction_level: Option<String>,
    pub feedback_status: String,
    pub reviewed_by_id: Option<Uuid>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub response_text: Option<String>,
    pub responded_by_id: Option<Uuid>,
    pub responded_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = customer_feedback)]
pub struct NewCustomerFeedback {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub installation_job_id: Uuid,
    pub completion_record_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub overall_rating: i32,
    pub service_quality_rating: Option<i32>,
    pub technician_rating: Option<i32>,
    pub timeliness_rating: Option<i32>,
    pub communication_rating: Option<i32>,
    pub comments: Option<String>,
    pub would_recommend: Option<bool>,
    pub satisfaction_level: Option<String>,
    pub feedback_status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = service_closures)]
#[diesel(belongs_to(InstallationJob))]
pub struct ServiceClosure {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub installation_job_id: Uuid,
    pub closure_status: String,
    pub requires_manager_approval: bool,
    pub feedback_received: bool,
    pub approved_by_id: Option<Uuid>,
    pub approved_at: Option<NaiveDateTime>,
    pub closed_by_id: Option<Uuid>,
    pub closed_at: Option<NaiveDateTime>,
    pub closure_notes: Option<String>,
    pub reopened_count: i32,
    pub last_reopened_at: Option<NaiveDateTime>,
    pub last_reopened_by_id: Option<Uuid>,
    pub last_reopen_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_closures)]
pub struct NewServiceClosure {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub installation_job_id: Uuid,
    pub closure_status: String,
    pub requires_manager_approval: bool,
    pub feedback_received: bool,
    pub closure_notes: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = notification_logs)]
pub struct NotificationLog {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub event_type: String,
    pub recipient: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub error: Option<String>,
    pub job_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notification_logs)]
pub struct NewNotificationLog {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub event_type: String,
    pub recipient: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub error: Option<String>,
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = refresh_tokens)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
