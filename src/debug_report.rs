use weft::{BuildReport, Plan, SolveDetails};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_solve(goals: &[String], details: &SolveDetails, plan: &Plan, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Solving: {}", goals.join(" ")), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Rewrite ━━━", ansi::GRAY));
    println!(
        "  {} passes, {} applied in {:?}",
        details.rewrite_passes, details.rewrites_applied, details.rewrite
    );
    if details.goals.as_slice() != goals {
        println!("  expanded goals: {}", details.goals.join(" "));
    }

    println!("\n{}", palette.paint("━━━ Search ━━━", ansi::GRAY));
    for pass in &details.passes {
        println!(
            "  pass {}: grounded {:>3}  expanded {:>3}  goals {:>4}  {}",
            pass.pass,
            pass.grounded,
            pass.expanded,
            pass.goals,
            palette.dim(format!("{:?}", pass.duration)),
        );
    }

    println!("\n{}", palette.paint("━━━ Plan ━━━", ansi::GRAY));
    if plan.is_empty() {
        println!("{}", palette.dim("  nothing to build"));
    } else {
        for line in plan.render().lines() {
            println!("  {line}");
        }
    }
    println!(
        "  {}",
        palette.dim(format!("emitted in {:?}, solve total {:?}", details.plan_emission, details.total))
    );
}

pub fn print_build(report: &BuildReport, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.paint("━━━ Build ━━━", ansi::GRAY));
    println!(
        "  {}",
        palette.paint(
            format!("{} steps: {} executed, {} fresh", report.steps, report.executed, report.fresh),
            ansi::GREEN,
        )
    );
}
