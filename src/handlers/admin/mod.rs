pub mod patient_admin;
