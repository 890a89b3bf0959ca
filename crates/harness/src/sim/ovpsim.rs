//! Coverage engine adapter (riscvOVPsim).
//!
//! Runs the coverage engine over the test binary with the configured metric
//! and, optionally, a second no-simulation pass folding the fresh coverage
//! into the campaign-wide aggregate (`sum.out`). The numeric results are
//! scraped from the tail of the report files: the engine appends summary
//! lines of the shape `Name : points/points_max : percent%`.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::common::{HarnessError, Result};
use crate::config::Config;
use crate::runner::{ProcessRequest, ProcessStage, Stage, StageDir, StageResult};
use crate::sim::RunBinary;

/// How many tail bytes of a report hold the summary lines.
const REPORT_TAIL: u64 = 150;

/// One parsed coverage summary line.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageEntry {
    /// Metric tag (`<metric>_<extensions>` or `uniq_instr`).
    pub kind: String,
    /// Points hit.
    pub points: u64,
    /// Total points.
    pub points_max: u64,
    /// Percentage hit.
    pub percent: f64,
}

/// The summary block of one report file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageReport {
    /// Coverage points hit.
    pub coverage: Option<CoverageEntry>,
    /// Unique instructions seen.
    pub instr_coverage: Option<CoverageEntry>,
}

/// Coverage results of one iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coverage {
    /// This run's report.
    pub current: Option<CoverageReport>,
    /// The campaign aggregate, when summing is enabled.
    pub sum: Option<CoverageReport>,
}

impl Coverage {
    /// This run's coverage points, when the report carried them.
    pub fn points(&self) -> Option<u64> {
        self.current.as_ref()?.coverage.as_ref().map(|c| c.points)
    }

    /// This run's coverage percentage, when the report carried it.
    pub fn percent(&self) -> Option<f64> {
        self.current.as_ref()?.coverage.as_ref().map(|c| c.percent)
    }

    /// Renders the indented table appended to compare reports.
    pub fn render_table(&self) -> String {
        let mut out = String::from("\nCOVERAGE\n");
        let mut section = |name: &str, report: &CoverageReport| {
            out.push_str(&format!(" * {name}\n"));
            for (label, entry) in [
                ("coverage", &report.coverage),
                ("instr_coverage", &report.instr_coverage),
            ] {
                if let Some(e) = entry {
                    out.push_str(&format!(
                        "   * {:<16}{:<20}: {:<16} ({}%)\n",
                        label,
                        format!(" ({})", e.kind),
                        format!("{}/{}", e.points, e.points_max),
                        e.percent
                    ));
                }
            }
        };
        if let Some(current) = &self.current {
            section("current", current);
        }
        if let Some(sum) = &self.sum {
            section("sum", sum);
        }
        out
    }
}

/// Stage running the coverage engine (and the optional aggregate fold).
pub struct CoverageStage {
    dir: StageDir,
    cov: ProcessStage,
    cov_sum: Option<ProcessStage>,
    covtype: String,
}

impl CoverageStage {
    /// Report file name of the per-run pass.
    pub const REPORT: &'static str = "cov_report.log";
    /// Report file name of the aggregate pass.
    pub const SUM_REPORT: &'static str = "covsum_report.log";

    /// Prepares the engine command lines.
    ///
    /// The engine processes run in nested work directories and write their
    /// outputs one level up, into this stage's directory.
    pub fn new(config: &Config, breakpoint: u64) -> Result<Self> {
        let dir = StageDir::indexed(&config.general.dir, "Coverage", config.general.log)?;
        dir.log_write("init_config.log", &format!("{config:?}\n"));

        let isa = &config.isa;
        let mut variant = format!("RV{}GC", isa.xlen);
        if isa.has_vector() {
            variant.push('V');
        }
        let base = vec![
            config.tools.riscvovpsim_bin.clone(),
            "--variant".to_string(),
            variant,
            "--extensions".to_string(),
            config.coverage.extensions.clone(),
            "--cover".to_string(),
            config.coverage.metric.as_str().to_string(),
        ];

        let mut cov_program = base.clone();
        cov_program.extend([
            "--outputfile".to_string(),
            "../cov.out".to_string(),
            "--finishonaddress".to_string(),
            format!("{breakpoint:#x}"),
            "--reportfile".to_string(),
            format!("../{}", Self::REPORT),
        ]);
        let cov = ProcessStage::new(
            StageDir::indexed(dir.path(), "OVPSim", config.general.log)?,
            cov_program,
        );

        let cov_sum = if config.coverage.sum_enable {
            let mut sum_program = base;
            sum_program.extend([
                "--nosimulation".to_string(),
                "--showuncovered".to_string(),
                "--inputfiles".to_string(),
                "../sum.out,../cov.out".to_string(),
                "--outputfile".to_string(),
                "../sum.out".to_string(),
                "--reportfile".to_string(),
                format!("../{}", Self::SUM_REPORT),
            ]);
            Some(ProcessStage::new(
                StageDir::indexed(dir.path(), "OVPSim", config.general.log)?,
                sum_program,
            ))
        } else {
            None
        };

        Ok(Self {
            dir,
            cov,
            cov_sum,
            covtype: format!(
                "{}_{}",
                config.coverage.metric.as_str(),
                config.coverage.extensions
            ),
        })
    }

    /// Parses the summary tail of a report file.
    pub fn extract_coverage(&self, path: &Path) -> Result<CoverageReport> {
        let mut file = std::fs::File::open(path)?;
        // only the last few lines carry the summary
        if file.seek(SeekFrom::End(-(REPORT_TAIL as i64))).is_err() {
            let _ = file.seek(SeekFrom::Start(0))?;
        }
        let mut tail = String::new();
        let _ = file.read_to_string(&mut tail).map_err(|_| {
            HarnessError::SimOutputParse(format!("report {} is not text", path.display()))
        })?;

        let mut report = CoverageReport::default();
        for line in tail.lines() {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() != 3 {
                continue;
            }
            let (name, points, percent) = (fields[0], fields[1], fields[2]);
            let percent: f64 = percent
                .split('%')
                .next()
                .unwrap_or("")
                .trim()
                .parse()
                .unwrap_or(0.0);
            let points_parts: Vec<&str> = points.split('/').collect();
            if points_parts.len() != 2 {
                continue;
            }
            let hit: u64 = points_parts[0].trim().parse().unwrap_or(0);
            let max: u64 = points_parts[1].trim().parse().unwrap_or(0);

            if name.contains("Coverage points hit") {
                report.coverage = Some(CoverageEntry {
                    kind: self.covtype.clone(),
                    points: hit,
                    points_max: max,
                    percent,
                });
            } else if name.contains("Unique instructions") {
                report.instr_coverage = Some(CoverageEntry {
                    kind: "uniq_instr".to_string(),
                    points: hit,
                    points_max: max,
                    percent,
                });
            }
        }
        Ok(report)
    }
}

impl Stage for CoverageStage {
    type Input = RunBinary;
    type Output = Coverage;

    fn dir(&self) -> &StageDir {
        &self.dir
    }

    fn abort_handle(&self) -> Option<crate::runner::AbortHandle> {
        self.cov.abort_handle()
    }

    fn task(&mut self, request: RunBinary) -> StageResult<Coverage> {
        let result = self.cov.run(ProcessRequest::new(
            vec![
                "--program".to_string(),
                request.binary.display().to_string(),
            ],
            request.timeout,
        ));
        if !result.is_complete() {
            return result.cast_failure();
        }

        if let Some(cov_sum) = &mut self.cov_sum {
            // the very first fold exits nonzero while still writing a valid
            // aggregate; the exit status is deliberately ignored
            let _ = cov_sum.run(ProcessRequest::new(Vec::new(), request.timeout));
        }

        let mut coverage = Coverage::default();
        match self.extract_coverage(&self.dir.path().join(Self::REPORT)) {
            Ok(report) => coverage.current = Some(report),
            Err(e) => return StageResult::error(format!("cannot parse coverage report: {e}")),
        }
        if self.cov_sum.is_some() {
            coverage.sum = self
                .extract_coverage(&self.dir.path().join(Self::SUM_REPORT))
                .ok();
        }

        StageResult::complete(coverage)
    }
}
