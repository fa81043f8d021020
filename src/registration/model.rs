//! Per-user registration data.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::extraction::{IdCardFields, VehicleBackFields, VehicleFrontFields};

use super::step::Step;

/// Document data accumulated as the upload steps complete.
///
/// Every field starts empty and is filled by the step that produces it.
/// Merges only ever overwrite with a non-empty value, so a field once set is
/// never cleared while the progress exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentData {
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub id_number: Option<String>,
    pub plate_number: Option<String>,
    pub vehicle_brand: Option<String>,
    pub vehicle_model: Option<String>,
    pub vin: Option<String>,
    pub policy_number: Option<String>,
    pub issue_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl DocumentData {
    /// Merge fields read from the ID card.
    pub fn apply_id_card(&mut self, fields: &IdCardFields) {
        set_if_present(&mut self.full_name, &fields.full_name);
        set_if_present(&mut self.date_of_birth, &fields.date_of_birth);
        set_if_present(&mut self.id_number, &fields.document_number);
    }

    /// Merge fields read from the front of the vehicle document.
    pub fn apply_vehicle_front(&mut self, fields: &VehicleFrontFields) {
        set_if_present(&mut self.plate_number, &fields.plate_number);
    }

    /// Merge fields read from the back of the vehicle document.
    pub fn apply_vehicle_back(&mut self, fields: &VehicleBackFields) {
        set_if_present(&mut self.vehicle_brand, &fields.brand);
        set_if_present(&mut self.vehicle_model, &fields.model);
        set_if_present(&mut self.vin, &fields.vin);
    }

    /// Assign the policy number and validity window. The policy expires one
    /// day after issue.
    pub fn issue_policy(&mut self, policy_number: u32, issued_at: DateTime<Utc>) {
        self.policy_number = Some(policy_number.to_string());
        self.issue_date = Some(issued_at);
        self.expiry_date = Some(issued_at + Duration::days(1));
    }

    /// Human-readable summary the user is asked to confirm.
    pub fn confirmation_summary(&self) -> String {
        format!(
            "Full Name: {}\nDate of Birth: {}\nID Card Number: {}\nCar Number: {}\nVehicle: {}\nVIN: {}",
            blank(&self.full_name),
            blank(&self.date_of_birth),
            blank(&self.id_number),
            blank(&self.plate_number),
            self.vehicle(),
            blank(&self.vin),
        )
    }

    /// Brand and model, space-separated, skipping whichever is missing.
    pub fn vehicle(&self) -> String {
        [&self.vehicle_brand, &self.vehicle_model]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The policy document filled with this data.
    pub fn policy_document(&self) -> String {
        format!(
            "CAR INSURANCE POLICY\n\n\
             🔹 Policy Number: {number}\n\
             🔹 Issue Date: {issued}\n\
             🔹 Valid Until: {expires}\n\n\
             📌 POLICYHOLDER:\n\
             ▸ Full Name: {name}\n\
             ▸ Date of Birth: {birth}\n\
             ▸ ID/Passport: {id}\n\n\
             🚗 VEHICLE DETAILS:\n\
             ▸ License Plate: {plate}\n\
             ▸ Vehicle: {vehicle}\n\
             ▸ VIN: {vin}\n\n\
             📋 COVERED RISKS:\n\
             ✓ Accident Damage\n\
             ✓ Theft\n\
             ✓ Third-Party Liability\n\
             ✓ Natural Disasters\n\
             ✓ Vandalism\n\
             ✓ Fire",
            number = blank(&self.policy_number),
            issued = date(&self.issue_date),
            expires = date(&self.expiry_date),
            name = blank(&self.full_name),
            birth = blank(&self.date_of_birth),
            id = blank(&self.id_number),
            plate = blank(&self.plate_number),
            vehicle = self.vehicle(),
            vin = blank(&self.vin),
        )
    }
}

/// One user's registration: the current step plus the data gathered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub step: Step,
    pub documents: DocumentData,
}

impl UserProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

fn set_if_present(target: &mut Option<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        *target = Some(value.to_string());
    }
}

fn blank(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn date(value: &Option<DateTime<Utc>>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
