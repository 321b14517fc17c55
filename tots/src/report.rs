//! Rapport de plan d'échantillonnage
//!
//! Ce module regroupe les résultats d'un calcul de plan, les anomalies
//! détectées sur les échantillons et les avertissements de session, pour
//! les afficher ou les enregistrer en JSON.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use tots_core::sample_types::SampleIssuesOutput;
use tots_core::types::attr;
use tots_core::{CalculateResultsData, PlanCalculation};

/// Statut global du rapport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlanStatus {
    /// Plan calculé sans anomalie
    Success,
    /// Plan calculé, avec des échantillons à vérifier
    NeedsReview,
    /// Rien à calculer
    Empty,
    /// Calcul impossible
    Failed,
}

/// Niveau de sévérité
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IssueLevel {
    /// Calcul abandonné
    Fatal,
    /// Échantillon à corriger
    Warning,
}

/// Anomalie rattachée (ou non) à un échantillon
#[derive(Debug, Clone, Serialize)]
pub struct PlanIssue {
    pub level: IssueLevel,
    pub sample_id: Option<String>,
    pub message: String,
}

/// Statistiques par type d'échantillon
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeStats {
    /// Nombre d'échantillons dessinés
    pub samples: usize,
    /// Nombre d'équivalents (somme des `AC`)
    pub area_count: u64,
    /// Surface échantillonnée (pieds carrés)
    pub sampled_area: f64,
}

/// Rapport complet d'un plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub scenario: String,
    pub duration_secs: f64,
    pub status: PlanStatus,

    pub samples: usize,
    pub by_type: HashMap<String, TypeStats>,
    pub results: Option<CalculateResultsData>,

    pub issues: Vec<PlanIssue>,
    pub warnings: Vec<String>,
}

impl PlanReport {
    pub fn new(scenario: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            duration_secs: 0.0,
            status: PlanStatus::Empty,
            samples: 0,
            by_type: HashMap::new(),
            results: None,
            issues: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Reprend les mesures et totaux d'un calcul
    pub fn record_calculation(&mut self, plan: &PlanCalculation) {
        for measure in &plan.samples {
            let type_name = measure
                .feature
                .attr_str(attr::TYPE)
                .unwrap_or("Unknown")
                .to_string();
            let stats = self.by_type.entry(type_name).or_default();
            stats.samples += 1;
            stats.area_count += measure.area_count;
            stats.sampled_area += measure.area_sq_ft();
        }
        self.samples += plan.samples.len();
        self.results = Some(plan.data.clone());
    }

    /// Reprend les anomalies de surface et d'attributs
    pub fn record_sample_issues(&mut self, output: &SampleIssuesOutput) {
        for issue in &output.samples_with_issues {
            if issue.area_out_of_tolerance {
                self.issues.push(PlanIssue {
                    level: IssueLevel::Warning,
                    sample_id: issue.permanent_identifier.clone(),
                    message: format!("Area differs from reference by {:.1} sq in", issue.difference),
                });
            }
            if issue.attribute_mismatch {
                self.issues.push(PlanIssue {
                    level: IssueLevel::Warning,
                    sample_id: issue.permanent_identifier.clone(),
                    message: format!(
                        "Attributes differ from sample type: {}",
                        issue.attributes_with_mismatch.join(", ")
                    ),
                });
            }
        }
    }

    /// Enregistre l'échec du calcul
    pub fn record_failure(&mut self, message: &str) {
        self.issues.push(PlanIssue {
            level: IssueLevel::Fatal,
            sample_id: None,
            message: message.to_string(),
        });
    }

    pub fn record_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let has_fatal = self.issues.iter().any(|i| i.level == IssueLevel::Fatal);

        self.status = if has_fatal {
            PlanStatus::Failed
        } else if self.results.is_none() {
            PlanStatus::Empty
        } else if !self.issues.is_empty() {
            PlanStatus::NeedsReview
        } else {
            PlanStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("SAMPLING PLAN - {}", self.scenario);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        if !self.by_type.is_empty() {
            println!("\n--- BY SAMPLE TYPE ---");
            let mut types: Vec<_> = self.by_type.iter().collect();
            types.sort_by_key(|(k, _)| k.as_str());
            for (type_name, stats) in types {
                println!(
                    "  {}: {} drawn, {} equivalent, {:.2} sq ft",
                    type_name, stats.samples, stats.area_count, stats.sampled_area
                );
            }
        }

        if let Some(r) = &self.results {
            println!("\n--- SAMPLING ---");
            println!("  Total Number of Samples: {}", r.total_samples);
            println!("  Total Sampled Area: {:.2} sq ft", r.total_sampled_area);
            if let Some(percent) = r.percent_area_sampled {
                println!("  Percent of Area Sampled: {:.2}%", percent);
            }
            println!("  Time to Complete Sampling: {:.2} days", r.time_to_complete_sampling);
            println!("  Total Sampling Cost: ${:.2}", r.total_sampling_cost);

            println!("\n--- ANALYSIS ---");
            println!("  Time to Complete Analyses: {:.2} days", r.time_to_complete_analyses);
            println!("  Total Analysis Cost: ${:.2}", r.total_analysis_cost);

            println!("\n--- TOTALS ---");
            println!("  Total Cost: ${:.2}", r.total_cost);
            println!("  Total Time: {:.2} days", r.total_time);
            println!("  Limiting Time Factor: {:?}", r.limiting_factor);
        }

        if !self.warnings.is_empty() {
            println!("\n--- WARNINGS ({}) ---", self.warnings.len());
            for w in self.warnings.iter().take(10) {
                println!("  {}", w);
            }
            if self.warnings.len() > 10 {
                println!("  ... and {} more", self.warnings.len() - 10);
            }
        }

        if !self.issues.is_empty() {
            println!("\n--- ISSUES ({}) ---", self.issues.len());
            for i in self.issues.iter().take(20) {
                let location = i
                    .sample_id
                    .as_deref()
                    .map(|id| format!("[{}]", id))
                    .unwrap_or_default();
                println!("  {:?} {} {}", i.level, location, i.message);
            }
            if self.issues.len() > 20 {
                println!("  ... and {} more", self.issues.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .context(format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        match &self.results {
            Some(r) => format!(
                "{}: {} samples, ${:.2} total cost, {:.2} days, {} issues",
                self.scenario,
                r.total_samples,
                r.total_cost,
                r.total_time,
                self.issues.len()
            ),
            None => format!("{}: nothing to calculate, {} issues", self.scenario, self.issues.len()),
        }
    }
}
