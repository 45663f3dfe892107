use crate::{
    browser_agent_search, calendar_reader, calendar_remover, calendar_writer, get_exchange_rate,
    get_lat_lon, get_today_date, read_master_profile, tasks_reader, tasks_remover, tasks_writer,
    tool_declarations, weather_forecast, web_search, FunctionDeclaration, ToolContext, ToolRunner,
};

/// Dispatches one adapter by name. Never fails; unknown names yield a `❌` line.
pub(crate) fn execute_tool(ctx: &ToolContext, name: &str, input: &str) -> String {
    match name {
        "WebSearch" => web_search(ctx, input),
        "BrowserAgentSearch" => browser_agent_search(ctx, input),
        "GetTodayDate" => get_today_date(input),
        "GetLatLon" => get_lat_lon(ctx, input),
        "WeatherForecast" => weather_forecast(ctx, input),
        "GetExchangeRate" => get_exchange_rate(ctx, input),
        "GetMasterInfo" => read_master_profile(&ctx.config.master_profile_path),
        "CalendarReader" => calendar_reader(ctx, input),
        "CalendarWriter" => calendar_writer(ctx, input),
        "CalendarRemover" => calendar_remover(ctx, input),
        "TasksReader" => tasks_reader(ctx, input),
        "TasksWriter" => tasks_writer(ctx, input),
        "TasksRemover" => tasks_remover(ctx, input),
        other => format!("❌ 不明なツールです: {other}"),
    }
}

impl ToolRunner for ToolContext {
    fn declarations(&self) -> Vec<FunctionDeclaration> {
        tool_declarations()
    }

    fn run(&self, name: &str, input: &str) -> String {
        let output = execute_tool(self, name, input);
        if output.starts_with('❌') {
            tracing::warn!(tool = name, output = %output, "tool reported failure");
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AkariConfig, FileConfig, EXCHANGE_FORMAT_GUIDANCE};

    fn ctx() -> ToolContext {
        ToolContext::new(AkariConfig::from_file_config(FileConfig::default()).unwrap())
    }

    #[test]
    fn unknown_tools_are_reported_not_panicked() {
        assert_eq!(execute_tool(&ctx(), "Calculator", "1+1"), "❌ 不明なツールです: Calculator");
    }

    #[test]
    fn offline_tools_dispatch_by_name() {
        let ctx = ctx();
        assert!(execute_tool(&ctx, "GetTodayDate", "").starts_with("現在の日時は "));
        assert_eq!(execute_tool(&ctx, "GetExchangeRate", "ドル円"), EXCHANGE_FORMAT_GUIDANCE);
        assert_eq!(ctx.run("GetExchangeRate", "USD JPY"), EXCHANGE_FORMAT_GUIDANCE);
    }
}
