//! Server-side documents the demos depend on: topic rules (evaluated by AWS
//! IoT Core, not here) and the device access policy.

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::{DeviceTopics, PolicyArgs, RulesArgs};
use crate::shadow::ShadowTopics;

const SQL_VERSION: &str = "2016-03-23";

/// One `aws iot create-topic-rule --cli-input-json` document.
#[derive(Debug, Serialize)]
pub struct TopicRule {
    #[serde(rename = "ruleName")]
    pub name: String,
    #[serde(rename = "topicRulePayload")]
    pub payload: TopicRulePayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRulePayload {
    pub sql: String,
    pub description: String,
    pub rule_disabled: bool,
    pub aws_iot_sql_version: &'static str,
    pub actions: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_action: Option<Value>,
}

/// Republish actions address reserved `$aws/...` topics as `$$aws/...`.
fn republish_topic(topic: &str) -> String {
    if topic.starts_with('$') {
        format!("${topic}")
    } else {
        topic.to_string()
    }
}

fn rule(args: &RulesArgs, name: &str, description: &str, sql: String, target: &str) -> TopicRule {
    TopicRule {
        name: name.to_string(),
        payload: TopicRulePayload {
            sql,
            description: description.to_string(),
            rule_disabled: false,
            aws_iot_sql_version: SQL_VERSION,
            actions: vec![json!({
                "republish": {
                    "roleArn": args.role_arn,
                    "topic": republish_topic(target),
                    "qos": 1,
                }
            })],
            error_action: args.log_group.as_ref().map(|group| {
                json!({
                    "cloudwatchLogs": {
                        "roleArn": args.role_arn,
                        "logGroupName": group,
                    }
                })
            }),
        },
    }
}

/// Rules that turn a button press into a pending notice and a desired shadow
/// state, and echo accepted reports back to the buttons device.
pub fn topic_rules(args: &RulesArgs) -> Vec<TopicRule> {
    let buttons = DeviceTopics::new(&args.button_client);
    let led_shadow = ShadowTopics::new(&args.led_thing_name);
    let desired = buttons.led_state_desired();

    vec![
        rule(
            args,
            "On_button_press",
            "Show a requested LED state as pending on the buttons device",
            format!("SELECT * FROM '{desired}'"),
            &buttons.led_state_pending(),
        ),
        rule(
            args,
            "On_button_press_shadow",
            "Write a requested LED state to the LED device shadow",
            format!(
                "SELECT {{\"desired\": {{\"Red\": Red, \"Green\": Green, \"Blue\": Blue}}}} AS state FROM '{desired}'"
            ),
            &led_shadow.update(),
        ),
        rule(
            args,
            "On_shadow_updated",
            "Echo the LED state reported to the shadow back to the buttons device",
            format!(
                "SELECT state.reported AS reported FROM '{}' WHERE NOT isUndefined(state.reported)",
                led_shadow.update_accepted()
            ),
            &buttons.led_state_reported(),
        ),
    ]
}

/// IoT policy for one demo device: connect as its client id, and talk on
/// the demo topics and the shadow topics of its things.
pub fn policy(args: &PolicyArgs) -> Value {
    let arn = |kind: &str, resource: &str| {
        format!("arn:aws:iot:{}:{}:{kind}/{resource}", args.region, args.account_id)
    };
    let client_id = args.client_id.as_deref().unwrap_or(&args.thing_name);

    let mut things = vec![args.thing_name.as_str()];
    if let Some(led_thing) = args.led_thing_name.as_deref() {
        if led_thing != args.thing_name {
            things.push(led_thing);
        }
    }

    let mut topics = vec![arn("topic", "demo_device/*")];
    let mut filters = vec![arn("topicfilter", "demo_device/*")];
    for thing in &things {
        let shadow = format!("$aws/things/{thing}/shadow/*");
        topics.push(arn("topic", &shadow));
        filters.push(arn("topicfilter", &shadow));
    }

    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": ["iot:Connect"],
                "Resource": [arn("client", client_id)],
            },
            {
                "Effect": "Allow",
                "Action": ["iot:Publish", "iot:Receive"],
                "Resource": topics,
            },
            {
                "Effect": "Allow",
                "Action": ["iot:Subscribe"],
                "Resource": filters,
            },
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules_args(log_group: Option<&str>) -> RulesArgs {
        RulesArgs {
            button_client: "buttons".into(),
            led_thing_name: "leds_demo_device".into(),
            role_arn: "arn:aws:iam::123456789012:role/demo-republish".into(),
            log_group: log_group.map(String::from),
        }
    }

    #[test]
    fn button_press_rules_read_the_desired_topic() {
        let rules = topic_rules(&rules_args(None));
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["On_button_press", "On_button_press_shadow", "On_shadow_updated"]);

        let json = serde_json::to_value(&rules[0]).unwrap();
        assert_eq!(
            json["topicRulePayload"]["sql"],
            "SELECT * FROM 'demo_device/buttons/led_state/desired'"
        );
        assert_eq!(
            json["topicRulePayload"]["actions"][0]["republish"]["topic"],
            "demo_device/buttons/led_state/pending"
        );
        assert_eq!(json["topicRulePayload"]["awsIotSqlVersion"], "2016-03-23");
        assert!(json["topicRulePayload"].get("errorAction").is_none());
        assert_eq!(json["ruleName"], "On_button_press");
    }

    #[test]
    fn reserved_republish_topics_are_escaped() {
        let rules = topic_rules(&rules_args(None));
        let json = serde_json::to_value(&rules[1]).unwrap();
        assert_eq!(
            json["topicRulePayload"]["actions"][0]["republish"]["topic"],
            "$$aws/things/leds_demo_device/shadow/update"
        );
        assert!(rules[2].payload.sql.contains("'$aws/things/leds_demo_device/shadow/update/accepted'"));
    }

    #[test]
    fn log_group_becomes_error_action() {
        let rules = topic_rules(&rules_args(Some("iot-demo-errors")));
        let json = serde_json::to_value(&rules[2]).unwrap();
        assert_eq!(
            json["topicRulePayload"]["errorAction"]["cloudwatchLogs"]["logGroupName"],
            "iot-demo-errors"
        );
    }

    #[test]
    fn policy_covers_both_shadows() {
        let doc = policy(&PolicyArgs {
            thing_name: "buttons".into(),
            led_thing_name: Some("leds_demo_device".into()),
            client_id: None,
            region: "us-east-1".into(),
            account_id: "123456789012".into(),
        });
        assert_eq!(
            doc["Statement"][0]["Resource"][0],
            "arn:aws:iot:us-east-1:123456789012:client/buttons"
        );
        let topics = doc["Statement"][1]["Resource"].as_array().unwrap();
        assert_eq!(topics.len(), 3);
        assert_eq!(
            topics[2],
            "arn:aws:iot:us-east-1:123456789012:topic/$aws/things/leds_demo_device/shadow/*"
        );
        assert_eq!(
            doc["Statement"][2]["Resource"][0],
            "arn:aws:iot:us-east-1:123456789012:topicfilter/demo_device/*"
        );
    }
}
